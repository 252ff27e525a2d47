//! `papi catalog refresh`: triggers `POST /v1/catalog/refresh` (spec.md §6
//! route table, admin-only) against a running server, the admin-path
//! analogue of the teacher's `grafana`/`slack` one-shot HTTP helpers.

use crate::Result;

pub fn refresh(server_addr: &str, admin_token: &str) -> Result<()> {
    let client = reqwest::blocking::Client::new();
    let resp = client
        .post(format!("{}/v1/catalog/refresh", server_addr.trim_end_matches('/')))
        .bearer_auth(admin_token)
        .send()?;
    if !resp.status().is_success() {
        bail!("catalog refresh failed: {} {}", resp.status(), resp.text().unwrap_or_default());
    }
    info!("catalog refresh triggered on {}", server_addr);
    Ok(())
}
