//! `papi config validate <path>`: loads a config template the same way
//! `papi_server`'s startup does (envsubst, then parse, then
//! `Config::validate`), so operators can catch a malformed config before
//! rolling it out (spec.md §6 fatal-startup-error case).

use std::path::Path;

use papi_definitions::config::Config;

use crate::Result;

pub fn validate(path: &Path) -> Result<()> {
    let cfg = Config::from_template_file(path)?;
    info!(
        "config at {} is valid: {} VO(s) configured, {} allowed",
        path.display(),
        cfg.vo.len(),
        cfg.auth.allowed_vos.len()
    );
    Ok(())
}
