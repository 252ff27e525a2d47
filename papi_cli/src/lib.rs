#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate log;

#[macro_use]
extern crate failure;

pub use failure::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// `papi config validate` — loads and validates a config template the way
/// the server does at startup, without starting the server.
pub mod config_cmd;

/// `papi template render` — dry-runs the Template Renderer against a job
/// template and a user config, without submitting anything to the
/// Scheduler.
pub mod render_cmd;

/// `papi catalog refresh` — triggers `POST /v1/catalog/refresh` on a
/// running server.
pub mod catalog_cmd;

/// `papi notify test-send` — sends a test notification through the Mailer
/// client, for verifying `backends.mailer_addr` without waiting for a real
/// deployment event.
pub mod notify_cmd;

/// Initializes TLS roots the way every outbound `reqwest` client in this
/// workspace needs, the one piece of global setup shared across commands.
pub fn init() {
    openssl_probe::init_ssl_cert_env_vars();
}
