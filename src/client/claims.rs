//! # Distributed and Aggregated Claims
//!
//! Resolution of `_claim_sources` per OpenID Connect Core §5.6.2.
//! Aggregated sources carry their claims inline as a JWT; distributed
//! sources name an endpoint the claims are fetched from as
//! `application/jwt` with a Bearer token. Source JWTs are verified against
//! the issuer named in their own `iss`: this client's issuer directly, a
//! previously-seen issuer through the global registry, or a first-met
//! issuer after a registry discovery.
//!
//! Claims merge into the map in place; already-merged sources are not
//! rolled back when a later source fails, and failures carry the offending
//! source name.

use std::collections::HashMap;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::debug;

use super::Client;
use crate::error::{Error, Result, RpError};
use crate::http::{self, Expect};
use crate::issuer::{Issuer, registry};
use crate::jose::jws;

impl Client {
    /// Merge aggregated claims carried inline in `_claim_sources`.
    ///
    /// # Errors
    ///
    /// The first failing source, annotated with its name. Successfully
    /// processed sources stay merged.
    pub async fn unpack_aggregated_claims(&self, claims: &mut Map<String, Value>) -> Result<()> {
        let sources = claim_sources(claims, |source| source.get("JWT").is_some());

        let mut first_error = None;
        for name in sources {
            let jwt = claims
                .get("_claim_sources")
                .and_then(|sources| sources.get(&name))
                .and_then(|source| source.get("JWT"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            match self.claim_jwt(&jwt).await {
                Ok(payload) => merge_source(claims, &name, &payload),
                Err(error) => {
                    first_error
                        .get_or_insert_with(|| RpError::claim_source(&name, error).into());
                }
            }
        }

        cleanup(claims);
        first_error.map_or(Ok(()), Err)
    }

    /// Fetch and merge distributed claims named in `_claim_sources`.
    ///
    /// `access_tokens` supplies Bearer tokens per source name for sources
    /// that do not embed their own `access_token`. Sources fan out
    /// concurrently and join before merging.
    ///
    /// # Errors
    ///
    /// The first failing source, annotated with its name. Successfully
    /// fetched sources stay merged.
    pub async fn fetch_distributed_claims(
        &self, claims: &mut Map<String, Value>, access_tokens: &HashMap<String, String>,
    ) -> Result<()> {
        let sources = claim_sources(claims, |source| source.get("endpoint").is_some());

        let fetches = sources.iter().map(|name| {
            let source = claims
                .get("_claim_sources")
                .and_then(|sources| sources.get(name))
                .cloned()
                .unwrap_or_default();
            let token = source
                .get("access_token")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .or_else(|| access_tokens.get(name).cloned());
            async move {
                let endpoint = source
                    .get("endpoint")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.fetch_claim_source(&endpoint, token.as_deref()).await
            }
        });
        let results = join_all(fetches).await;

        let mut first_error = None;
        for (name, result) in sources.into_iter().zip(results) {
            match result {
                Ok(payload) => merge_source(claims, &name, &payload),
                Err(error) => {
                    first_error
                        .get_or_insert_with(|| RpError::claim_source(&name, error).into());
                }
            }
        }

        cleanup(claims);
        first_error.map_or(Ok(()), Err)
    }

    /// Fetch one distributed claim source.
    async fn fetch_claim_source(
        &self, endpoint: &str, access_token: Option<&str>,
    ) -> Result<Map<String, Value>, Error> {
        debug!(%endpoint, "fetching distributed claims");

        let mut request = self
            .plain_http()
            .get(endpoint)
            .header(http::ACCEPT_HEADER, "application/jwt");
        if let Some(token) = access_token {
            let (header, value) = http::bearer(token);
            request = request.header(header, value);
        }

        let response = http::dispatch(request, Expect::Success).await?;
        if !response
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/jwt"))
        {
            return Err(RpError::Jwt(
                "expected application/jwt response from the claim source".to_string(),
            )
            .into());
        }

        let jwt = String::from_utf8_lossy(&response.body).trim().to_string();
        self.claim_jwt(&jwt).await
    }

    /// Decode and verify a claim-source JWT against the issuer its `iss`
    /// names.
    async fn claim_jwt(&self, jwt: &str) -> Result<Map<String, Value>, Error> {
        let decoded = jws::decode(jwt)?;
        let alg = decoded.header.alg.as_str();
        if alg == "none" {
            return Ok(decoded.payload);
        }

        if alg.starts_with("HS") {
            let key = self.secret_for_alg(alg)?;
            jws::verify(&decoded, &key)?;
            return Ok(decoded.payload);
        }

        let iss = decoded
            .payload
            .get("iss")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let key = if iss.is_empty() || iss == self.issuer().issuer {
            self.issuer().key(&decoded.header)?.clone()
        } else if let Some(known) = registry::get(&iss) {
            known.key(&decoded.header)?.clone()
        } else {
            let discovered = Issuer::discover(&iss, self.plain_http()).await?;
            let discovered = registry::register(discovered);
            discovered.key(&decoded.header)?.clone()
        };

        jws::verify(&decoded, &key)?;
        Ok(decoded.payload)
    }
}

/// Source names matching a predicate, in their serialization order.
fn claim_sources(
    claims: &Map<String, Value>, predicate: impl Fn(&Value) -> bool,
) -> Vec<String> {
    claims
        .get("_claim_sources")
        .and_then(Value::as_object)
        .map(|sources| {
            sources
                .iter()
                .filter(|(_, source)| predicate(source))
                .map(|(name, _)| name.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Move a resolved source's claims to the top level and drop its
/// bookkeeping entries.
fn merge_source(claims: &mut Map<String, Value>, source_name: &str, payload: &Map<String, Value>) {
    let assigned: Vec<String> = claims
        .get("_claim_names")
        .and_then(Value::as_object)
        .map(|names| {
            names
                .iter()
                .filter(|(_, assigned)| assigned.as_str() == Some(source_name))
                .map(|(claim, _)| claim.clone())
                .collect()
        })
        .unwrap_or_default();

    for claim in &assigned {
        if let Some(value) = payload.get(claim) {
            claims.insert(claim.clone(), value.clone());
        }
        if let Some(names) = claims.get_mut("_claim_names").and_then(Value::as_object_mut) {
            names.remove(claim);
        }
    }
    if let Some(sources) = claims.get_mut("_claim_sources").and_then(Value::as_object_mut) {
        sources.remove(source_name);
    }
}

/// Remove `_claim_names` / `_claim_sources` once both are exhausted.
fn cleanup(claims: &mut Map<String, Value>) {
    let names_empty = claims
        .get("_claim_names")
        .and_then(Value::as_object)
        .is_none_or(serde_json::Map::is_empty);
    let sources_empty = claims
        .get("_claim_sources")
        .and_then(Value::as_object)
        .is_none_or(serde_json::Map::is_empty);

    if names_empty && sources_empty {
        claims.remove("_claim_names");
        claims.remove("_claim_sources");
    }
}
