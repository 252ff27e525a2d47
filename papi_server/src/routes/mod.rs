//! Route registration and the small set of helpers every handler shares:
//! VO-membership checks and ownership assertions (spec.md §6 route table,
//! §7 error taxonomy).

pub mod catalog;
pub mod deployments;
pub mod health;
pub mod inference;
pub mod llm;
pub mod secrets;
pub mod snapshots;
pub mod stats;
pub mod tryme;

use actix_web::web;

use crate::auth::Claims;
use crate::errors::{HttpError, HttpResult};
use crate::state::Server;
use papi_definitions::error::ErrorKind;

/// Every VO-scoped route requires the caller's token to actually name the
/// VO being operated on, in addition to the server-wide allow-list check
/// already performed at token verification (spec.md §6 "claims must
/// include at least one VO in the configured allow-list").
pub fn ensure_vo_membership(server: &Server, claims: &Claims, vo: &str) -> HttpResult<()> {
    if !server.config.is_vo_allowed(vo) {
        return Err(HttpError(ErrorKind::BadRequest(format!("unknown VO '{}'", vo)).into()));
    }
    if !claims.vos.iter().any(|v| v == vo) {
        return Err(HttpError(
            ErrorKind::Forbidden(format!("caller is not a member of VO '{}'", vo)).into(),
        ));
    }
    Ok(())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health)
        .service(health::version)
        .service(catalog::list)
        .service(catalog::detail)
        .service(catalog::metadata)
        .service(catalog::config_schema)
        .service(catalog::refresh)
        .service(deployments::list)
        .service(deployments::create)
        .service(deployments::get)
        .service(deployments::delete)
        .service(tryme::list)
        .service(tryme::create)
        .service(tryme::delete)
        .service(inference::list)
        .service(inference::create)
        .service(inference::update)
        .service(inference::delete)
        .service(inference::logs)
        .service(snapshots::list)
        .service(snapshots::create)
        .service(snapshots::delete)
        .service(secrets::list)
        .service(secrets::get)
        .service(secrets::put)
        .service(secrets::delete)
        .service(stats::deployments)
        .service(stats::cluster)
        .service(llm::list_models)
        .service(llm::proxy);
}
