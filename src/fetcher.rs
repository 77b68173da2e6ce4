//! Remote attribute fetching.
//!
//! Authenticated GETs against the profile and group endpoints, decoded into
//! typed results. Every fetch is attempted exactly once; there is no cache
//! and no retry.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::{GateError, GateResult};
use crate::types::{AccessToken, GroupId};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

const PROFILE_CONTEXT: &str = "profile";
const GROUPS_CONTEXT: &str = "groups";

/// HTTP settings for the fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Deadline for a single request, including reading the body.
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

/// Fetches scalar fields and group lists on behalf of a bearer token.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct AttributeFetcher {
    client: reqwest::Client,
}

impl AttributeFetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new(config: &FetcherConfig) -> GateResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GateError::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Use an existing client, e.g. one shared with the rest of the login flow.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch `container_key.field_key` from a JSON object document.
    ///
    /// String values are returned unchanged and integers are rendered in
    /// decimal. Anything else counts as missing.
    pub async fn fetch_field(
        &self,
        endpoint: &Url,
        token: &AccessToken,
        container_key: &str,
        field_key: &str,
    ) -> GateResult<String> {
        let body = self.get(endpoint, token, PROFILE_CONTEXT).await?;
        let document: Map<String, Value> = serde_json::from_slice(&body)
            .map_err(|e| GateError::remote_decode(PROFILE_CONTEXT, e))?;

        extract_field(&document, container_key, field_key)
    }

    /// Fetch the group identifiers listed by a group-membership endpoint,
    /// in document order.
    pub async fn fetch_group_identifiers(
        &self,
        endpoint: &Url,
        token: &AccessToken,
    ) -> GateResult<Vec<GroupId>> {
        let body = self.get(endpoint, token, GROUPS_CONTEXT).await?;
        let entries: Vec<Map<String, Value>> = serde_json::from_slice(&body)
            .map_err(|e| GateError::remote_decode(GROUPS_CONTEXT, e))?;

        extract_group_ids(entries)
    }

    async fn get(
        &self,
        endpoint: &Url,
        token: &AccessToken,
        context: &str,
    ) -> GateResult<Vec<u8>> {
        debug!("GET {} ({})", endpoint, context);

        let response = self
            .client
            .get(endpoint.clone())
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| GateError::transport(context, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            debug!("{} endpoint answered {}", context, status);
            return Err(GateError::remote_status(context, status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GateError::transport(context, e))?;

        Ok(body.to_vec())
    }
}

fn extract_field(
    document: &Map<String, Value>,
    container_key: &str,
    field_key: &str,
) -> GateResult<String> {
    let path = format!("{}.{}", container_key, field_key);

    let value = document
        .get(container_key)
        .and_then(Value::as_object)
        .and_then(|container| container.get(field_key))
        .ok_or_else(|| GateError::field_missing(path.as_str()))?;

    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        _ => Err(GateError::field_missing(path)),
    }
}

fn extract_group_ids(entries: Vec<Map<String, Value>>) -> GateResult<Vec<GroupId>> {
    entries
        .into_iter()
        .enumerate()
        .map(|(index, mut entry)| match entry.remove("id") {
            Some(Value::String(id)) => Ok(GroupId::from(id)),
            _ => Err(GateError::field_missing(format!("groups[{}].id", index))),
        })
        .collect()
}
