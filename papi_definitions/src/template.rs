//! C3 — Template Renderer.
//!
//! Implements the tokenizer recommended in Design Notes §9: a template is
//! split once into `Literal | UserPlaceholder(name) | RuntimePlaceholder`
//! fragments, and only the middle kind is substituted. Because tokenization
//! happens exactly once, over the *template*, and never again over the
//! *output*, a user-supplied value containing `${...}` can never trigger a
//! second round of expansion — this is what spec.md §4.3 calls "escaped
//! such that they cannot introduce new placeholders".

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ErrorKind, Result};
use crate::workload::{ConfigSchema, UserConfig, WorkloadKind};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Fragment {
    Literal(String),
    User(String),
    Runtime(String),
}

fn placeholder_regex() -> Regex {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}").unwrap()
}

/// A placeholder is a *user* placeholder iff its name is entirely
/// uppercase/underscore/digit (`${UPPERCASE}`); otherwise (lowercase start,
/// or the `meta*` family) it is a runtime placeholder left for the
/// Scheduler.
fn is_user_placeholder(name: &str) -> bool {
    name.chars()
        .next()
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
}

fn tokenize(template: &str) -> Vec<Fragment> {
    let re = placeholder_regex();
    let mut out = Vec::new();
    let mut last = 0;
    for m in re.find_iter(template) {
        if m.start() > last {
            out.push(Fragment::Literal(template[last..m.start()].to_string()));
        }
        let name = &template[m.start() + 2..m.end() - 1];
        if is_user_placeholder(name) {
            out.push(Fragment::User(name.to_string()));
        } else {
            out.push(Fragment::Runtime(m.as_str().to_string()));
        }
        last = m.end();
    }
    if last < template.len() {
        out.push(Fragment::Literal(template[last..].to_string()));
    }
    out
}

/// Substitutes every user placeholder found in `template` using `subs`.
/// Fails with a `bad-request` error naming the missing placeholder if the
/// template references a `${UPPERCASE}` name absent from `subs`. Runtime
/// placeholders (`${lowercase...}`, `${meta...}`) are passed through
/// untouched, so this never fails merely because the template also has
/// Scheduler-resolved placeholders (spec.md §4.3 "Contract").
pub fn render(template: &str, subs: &BTreeMap<String, String>) -> Result<String> {
    let fragments = tokenize(template);
    let mut out = String::with_capacity(template.len());
    for frag in fragments {
        match frag {
            Fragment::Literal(s) => out.push_str(&s),
            Fragment::Runtime(raw) => out.push_str(&raw),
            Fragment::User(name) => {
                let value = subs.get(&name).ok_or_else(|| {
                    ErrorKind::BadRequest(format!("missing-placeholder({})", name))
                })?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// The computed fields a Deployment's substitution map always carries
/// (spec.md §4.3 step 3), independent of the workload's own user-supplied
/// parameters.
#[derive(Debug, Clone)]
pub struct ComputedFields {
    pub job_uuid: Uuid,
    pub hostname: String,
    pub namespace: String,
    pub base_domain: String,
    pub owner: String,
    pub owner_name: String,
    pub owner_email: String,
    pub priority: i64,
    pub shared_memory_mb: i64,
    pub gpu_modelname: String,
    pub kind: WorkloadKind,
    pub workload_name: String,
}

pub const GPU_MODEL_SENTINEL: &str = "any";

pub struct ComputeFieldsInput<'a> {
    pub kind: WorkloadKind,
    pub workload_name: &'a str,
    pub user_hostname: Option<&'a str>,
    pub namespace: &'a str,
    pub base_domain: &'a str,
    pub owner: &'a str,
    pub owner_name: &'a str,
    pub owner_email: &'a str,
    pub ram_mb: i64,
    pub gpu_model: Option<&'a str>,
}

/// Resolves the computed fields from auth claims, VO mapping, and
/// user-supplied hardware parameters.
pub fn compute_fields(input: ComputeFieldsInput) -> ComputedFields {
    let job_uuid = Uuid::new_v4();
    let hostname = input
        .user_hostname
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| job_uuid.to_string());
    ComputedFields {
        job_uuid,
        hostname,
        namespace: input.namespace.to_string(),
        base_domain: input.base_domain.to_string(),
        owner: input.owner.to_string(),
        owner_name: input.owner_name.to_string(),
        owner_email: input.owner_email.to_string(),
        priority: input.kind.priority_band(),
        shared_memory_mb: input.ram_mb / 2,
        gpu_modelname: input
            .gpu_model
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| GPU_MODEL_SENTINEL.to_string()),
        kind: input.kind,
        workload_name: input.workload_name.to_string(),
    }
}

impl ComputedFields {
    pub fn into_substitution_map(self) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("JOB_UUID".into(), self.job_uuid.to_string());
        m.insert("HOSTNAME".into(), self.hostname);
        m.insert("NAMESPACE".into(), self.namespace);
        m.insert("BASE_DOMAIN".into(), self.base_domain);
        m.insert("OWNER".into(), self.owner);
        m.insert("OWNER_NAME".into(), self.owner_name);
        m.insert("OWNER_EMAIL".into(), self.owner_email);
        m.insert("PRIORITY".into(), self.priority.to_string());
        m.insert("SHARED_MEMORY".into(), self.shared_memory_mb.to_string());
        m.insert("GPU_MODELNAME".into(), self.gpu_modelname);
        m.insert("KIND".into(), self.kind.to_string());
        m.insert("WORKLOAD_NAME".into(), self.workload_name);
        m
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flattens a user config (grouped by section) into the `${UPPERCASE}`
/// substitution-map keys the template expects: each field's own key,
/// upper-cased.
pub fn flatten_user_config(config: &UserConfig) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for section in config.values() {
        for (field, value) in section {
            out.insert(field.to_uppercase(), value_to_string(value));
        }
    }
    out
}

const TITLE_MAX_LEN: usize = 45;
const IDE_PASSWORD_MIN_LEN: usize = 9;

/// Step 2 of the rendering pipeline: structural/range validation of the
/// user's submitted config against the schema, plus the fixed constraints
/// from spec.md §4.3 step 2 (title length, IDE password length, hostname
/// charset).
pub fn validate_user_config(schema: &ConfigSchema, config: &UserConfig) -> Result<()> {
    for (section_name, section) in schema.sections() {
        for (field, param) in section {
            let supplied = config.get(section_name).and_then(|s| s.get(field));
            match supplied {
                Some(v) => param.validate(field, v)?,
                None if param.required => {
                    return Err(ErrorKind::BadRequest(format!(
                        "{}.{} is required",
                        section_name, field
                    ))
                    .into())
                }
                None => {}
            }
        }
    }

    if let Some(title) = config.get("general").and_then(|g| g.get("title")) {
        let title = title.as_str().unwrap_or_default();
        if title.chars().count() > TITLE_MAX_LEN {
            return Err(ErrorKind::BadRequest(format!(
                "general.title exceeds {} characters",
                TITLE_MAX_LEN
            ))
            .into());
        }
    }

    if let Some(hostname) = config.get("general").and_then(|g| g.get("hostname")) {
        let hostname = hostname.as_str().unwrap_or_default();
        if !hostname.is_empty() && !hostname.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ErrorKind::BadRequest(
                "general.hostname must be alphanumeric only".into(),
            )
            .into());
        }
    }

    for pw_field in ["jupyter_password", "ide_password", "vscode_password"] {
        if let Some(pw) = config.get("general").and_then(|g| g.get(pw_field)) {
            let pw = pw.as_str().unwrap_or_default();
            if pw.chars().count() < IDE_PASSWORD_MIN_LEN {
                return Err(ErrorKind::BadRequest(format!(
                    "general.{} must be at least {} characters",
                    pw_field, IDE_PASSWORD_MIN_LEN
                ))
                .into());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::ConfigParam;

    #[test]
    fn tokenizes_mixed_user_and_runtime_placeholders() {
        let tpl = "job ${JOB_UUID} on ${meta.node} with ${lowercase_thing}";
        let frags = tokenize(tpl);
        assert_eq!(
            frags,
            vec![
                Fragment::Literal("job ".into()),
                Fragment::User("JOB_UUID".into()),
                Fragment::Literal(" on ".into()),
                Fragment::Runtime("${meta.node}".into()),
                Fragment::Literal(" with ".into()),
                Fragment::Runtime("${lowercase_thing}".into()),
            ]
        );
    }

    #[test]
    fn partial_substitution_leaves_runtime_placeholders_untouched() {
        let mut subs = BTreeMap::new();
        subs.insert("HOSTNAME".to_string(), "demo".to_string());
        let out = render("host=${HOSTNAME} node=${meta.node}", &subs).unwrap();
        assert_eq!(out, "host=demo node=${meta.node}");
    }

    #[test]
    fn missing_user_placeholder_fails() {
        let subs = BTreeMap::new();
        let err = render("title=${TITLE}", &subs).unwrap_err();
        match err.kind() {
            ErrorKind::BadRequest(msg) => assert_eq!(msg, "missing-placeholder(TITLE)"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rendering_is_idempotent() {
        let mut subs = BTreeMap::new();
        subs.insert("TITLE".to_string(), "hello".to_string());
        let tpl = "name: ${TITLE}, keep: ${meta.raw}";
        let out1 = render(tpl, &subs).unwrap();
        let out2 = render(tpl, &subs).unwrap();
        assert_eq!(out1, out2);
    }

    #[test]
    fn user_value_containing_placeholder_syntax_is_inert() {
        let mut subs = BTreeMap::new();
        subs.insert("TITLE".to_string(), "${OWNER_EMAIL}".to_string());
        let out = render("title: ${TITLE}", &subs).unwrap();
        assert_eq!(out, "title: ${OWNER_EMAIL}");
        assert_eq!("${OWNER_EMAIL}".len(), 14);
        // The literal placeholder text appears but is not further expanded:
        // re-rendering the *output* as a template would differ from
        // rendering the *original template* twice, demonstrating we never
        // do that.
        let mut empty = BTreeMap::new();
        empty.insert("OWNER_EMAIL".to_string(), "alice@x.example".to_string());
        let rescanned = render(&out, &empty);
        assert!(rescanned.is_ok());
        assert_ne!(rescanned.unwrap(), out, "rendering never re-scans its own output");
    }

    #[test]
    fn shared_memory_is_half_ram() {
        let fields = compute_fields(ComputeFieldsInput {
            kind: WorkloadKind::Module,
            workload_name: "demo-workload",
            user_hostname: None,
            namespace: "vo-a".into(),
            base_domain: "a.deploy.example".into(),
            owner: "alice".into(),
            owner_name: "Alice".into(),
            owner_email: "alice@x.example".into(),
            ram_mb: 8000,
            gpu_model: None,
        });
        assert_eq!(fields.shared_memory_mb, 4000);
        assert_eq!(fields.gpu_modelname, GPU_MODEL_SENTINEL);
    }

    #[test]
    fn hostname_falls_back_to_job_uuid() {
        let fields = compute_fields(ComputeFieldsInput {
            kind: WorkloadKind::Module,
            workload_name: "demo-workload",
            user_hostname: None,
            namespace: "vo-a".into(),
            base_domain: "a.deploy.example".into(),
            owner: "alice".into(),
            owner_name: "Alice".into(),
            owner_email: "alice@x.example".into(),
            ram_mb: 8000,
            gpu_model: None,
        });
        assert_eq!(fields.hostname, fields.job_uuid.to_string());
    }

    #[test]
    fn validate_rejects_overlong_title() {
        let schema = ConfigSchema::default();
        let mut config: UserConfig = BTreeMap::new();
        let mut general = BTreeMap::new();
        general.insert("title".into(), Value::from("x".repeat(46)));
        config.insert("general".into(), general);
        assert!(validate_user_config(&schema, &config).is_err());
    }

    #[test]
    fn validate_rejects_short_ide_password() {
        let schema = ConfigSchema::default();
        let mut config: UserConfig = BTreeMap::new();
        let mut general = BTreeMap::new();
        general.insert("jupyter_password".into(), Value::from("short"));
        config.insert("general".into(), general);
        assert!(validate_user_config(&schema, &config).is_err());
    }

    #[test]
    fn validate_rejects_non_alphanumeric_hostname() {
        let schema = ConfigSchema::default();
        let mut config: UserConfig = BTreeMap::new();
        let mut general = BTreeMap::new();
        general.insert("hostname".into(), Value::from("not-alnum!"));
        config.insert("general".into(), general);
        assert!(validate_user_config(&schema, &config).is_err());
    }

    #[test]
    fn validate_enforces_required_fields_from_schema() {
        let mut schema = ConfigSchema::default();
        schema.general.insert(
            "docker_image".into(),
            ConfigParam {
                name: "Docker image".into(),
                value: Value::Null,
                options: None,
                range: None,
                description: None,
                required: true,
            },
        );
        let config: UserConfig = BTreeMap::new();
        assert!(validate_user_config(&schema, &config).is_err());
    }

    #[test]
    fn flattens_user_config_upper_cased() {
        let mut config: UserConfig = BTreeMap::new();
        let mut hardware = BTreeMap::new();
        hardware.insert("cpu_num".into(), Value::from(4));
        config.insert("hardware".into(), hardware);
        let flat = flatten_user_config(&config);
        assert_eq!(flat.get("CPU_NUM").map(String::as_str), Some("4"));
    }
}
