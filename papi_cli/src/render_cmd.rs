//! `papi template render`: dry-runs C3's tokenize/validate/substitute
//! pipeline against a job template and a user config, without resolving
//! secrets or submitting anything to the Scheduler. Lets an operator
//! iterate on a catalog item's template and schema offline.

use std::fs;
use std::path::Path;

use papi_definitions::template::{compute_fields, flatten_user_config, render, validate_user_config, ComputeFieldsInput};
use papi_definitions::workload::{ConfigSchema, UserConfig, WorkloadKind};

use crate::Result;

pub struct RenderArgs<'a> {
    pub kind: WorkloadKind,
    pub workload_name: &'a str,
    pub schema_path: &'a Path,
    pub config_path: &'a Path,
    pub template_path: &'a Path,
    pub namespace: &'a str,
    pub base_domain: &'a str,
    pub owner: &'a str,
    pub owner_name: &'a str,
    pub owner_email: &'a str,
}

pub fn render_dry_run(args: RenderArgs) -> Result<String> {
    let schema: ConfigSchema = serde_yaml::from_str(&fs::read_to_string(args.schema_path)?)?;
    let config: UserConfig = serde_yaml::from_str(&fs::read_to_string(args.config_path)?)?;
    let template = fs::read_to_string(args.template_path)?;

    validate_user_config(&schema, &config)?;

    let mut subs = flatten_user_config(&config);
    let ram_mb = config
        .get("hardware")
        .and_then(|h| h.get("ram"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let gpu_model = config
        .get("hardware")
        .and_then(|h| h.get("gpu_model"))
        .and_then(|v| v.as_str());
    let hostname = config
        .get("general")
        .and_then(|g| g.get("hostname"))
        .and_then(|v| v.as_str());

    let computed = compute_fields(ComputeFieldsInput {
        kind: args.kind,
        workload_name: args.workload_name,
        user_hostname: hostname,
        namespace: args.namespace,
        base_domain: args.base_domain,
        owner: args.owner,
        owner_name: args.owner_name,
        owner_email: args.owner_email,
        ram_mb,
        gpu_model,
    });
    for (k, v) in computed.into_substitution_map() {
        subs.insert(k, v);
    }

    Ok(render(&template, &subs)?)
}
