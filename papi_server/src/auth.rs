//! C1 — auth boundary.
//!
//! SPEC_FULL.md explicitly scopes out re-implementing a general OIDC stack:
//! claim verification is modeled as a pluggable `ClaimsVerifier` trait, with
//! one HTTP-JWKS-backed default implementation. The trait is the seam a
//! test double substitutes for in route tests; `JwksVerifier` is the only
//! production implementation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_derive::Deserialize;

use papi_definitions::error::{ErrorKind, Result};

/// The subset of a verified token's claims PAPI's route layer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub email: String,
    pub name: String,
    pub vos: Vec<String>,
    pub entitlements: Vec<String>,
}

#[async_trait]
pub trait ClaimsVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Result<Claims>;
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "eduperson_entitlement")]
    entitlements: Vec<String>,
    #[serde(default)]
    vos: Vec<String>,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

struct CachedJwks {
    fetched_at: Instant,
    keys: HashMap<String, DecodingKey>,
}

const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Fetches each configured issuer's `/.well-known/jwks.json` (caching for an
/// hour) and verifies the RS256 signature plus issuer/VO allow-list.
pub struct JwksVerifier {
    client: reqwest::Client,
    issuers: Vec<String>,
    allowed_vos: Vec<String>,
    cache: RwLock<HashMap<String, CachedJwks>>,
}

impl JwksVerifier {
    pub fn new(client: reqwest::Client, issuers: Vec<String>, allowed_vos: Vec<String>) -> JwksVerifier {
        JwksVerifier {
            client,
            issuers,
            allowed_vos,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn jwks_for(&self, issuer: &str) -> Result<HashMap<String, DecodingKey>> {
        if let Some(cached) = self.cache.read().unwrap().get(issuer) {
            if cached.fetched_at.elapsed() < JWKS_TTL {
                return Ok(cached.keys.clone());
            }
        }
        let url = format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'));
        let doc: JwksDocument = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ErrorKind::AuthFailed(format!("fetching JWKS from {}: {}", issuer, e)))?
            .json()
            .await
            .map_err(|e| ErrorKind::AuthFailed(format!("parsing JWKS from {}: {}", issuer, e)))?;
        let mut keys = HashMap::new();
        for jwk in doc.keys {
            let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                .map_err(|e| ErrorKind::AuthFailed(format!("invalid JWK from {}: {}", issuer, e)))?;
            keys.insert(jwk.kid, key);
        }
        self.cache.write().unwrap().insert(
            issuer.to_string(),
            CachedJwks {
                fetched_at: Instant::now(),
                keys: keys.clone(),
            },
        );
        Ok(keys)
    }
}

#[async_trait]
impl ClaimsVerifier for JwksVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<Claims> {
        let header = decode_header(bearer_token)
            .map_err(|e| ErrorKind::AuthFailed(format!("malformed token header: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| ErrorKind::AuthFailed("token header has no 'kid'".into()))?;

        let mut last_err = None;
        for issuer in &self.issuers {
            let keys = match self.jwks_for(issuer).await {
                Ok(k) => k,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            let key = match keys.get(&kid) {
                Some(k) => k,
                None => continue,
            };

            let mut validation = Validation::new(Algorithm::RS256);
            validation.set_issuer(&[issuer.as_str()]);
            let data = match decode::<RawClaims>(bearer_token, key, &validation) {
                Ok(d) => d,
                Err(e) => {
                    last_err = Some(ErrorKind::AuthFailed(format!("token rejected by {}: {}", issuer, e)).into());
                    continue;
                }
            };
            let raw = data.claims;
            if raw.iss != *issuer {
                continue;
            }
            if !raw.vos.iter().any(|v| self.allowed_vos.contains(v)) {
                return Err(ErrorKind::Forbidden(format!(
                    "token for '{}' names no allow-listed VO",
                    raw.sub
                ))
                .into());
            }
            return Ok(Claims {
                subject: raw.sub,
                email: raw.email,
                name: raw.name,
                vos: raw.vos,
                entitlements: raw.entitlements,
            });
        }
        Err(last_err.unwrap_or_else(|| ErrorKind::AuthFailed("no configured issuer signed this token".into()).into()))
    }
}

/// Request extractor: every authenticated route takes `AuthUser` as an
/// argument rather than reaching into the request by hand (spec.md §6
/// "bearer token in Authorization").
pub struct AuthUser(pub Claims);

impl actix_web::FromRequest for AuthUser {
    type Error = crate::errors::HttpError;
    type Future = futures_util::future::LocalBoxFuture<'static, std::result::Result<AuthUser, Self::Error>>;

    fn from_request(req: &actix_web::HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        use actix_web::web::Data;
        let server = req.app_data::<Data<crate::state::Server>>().cloned();
        let header = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Box::pin(async move {
            let server = server.ok_or_else(|| {
                crate::errors::HttpError(ErrorKind::Internal("server state missing".into()).into())
            })?;
            let token = header
                .as_deref()
                .and_then(|h| h.strip_prefix("Bearer "))
                .ok_or_else(|| crate::errors::HttpError(ErrorKind::AuthFailed("missing bearer token".into()).into()))?;
            let claims = server.verifier.verify(token).await.map_err(crate::errors::HttpError)?;
            Ok(AuthUser(claims))
        })
    }
}
