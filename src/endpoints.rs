//! Dataporten endpoint set.
//!
//! Endpoints are resolved once from operator overrides and the
//! authorization policy, then shared read-only for the life of the gate.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GateError, GateResult};
use crate::policy::AuthorizationPolicy;

pub const PROVIDER_NAME: &str = "DataPorten";

pub const DEFAULT_LOGIN_URL: &str = "https://auth.dataporten.no/oauth/authorization";
pub const DEFAULT_REDEEM_URL: &str = "https://auth.dataporten.no/oauth/token";
pub const DEFAULT_PROFILE_URL: &str = "https://auth.dataporten.no/userinfo";
pub const DEFAULT_GROUPS_URL: &str = "https://groups-api.dataporten.no/groups/me/groups";
pub const DEFAULT_SCOPE: &str = "groups userid";

/// Operator-supplied endpoint overrides. Unset or empty values fall back to
/// the Dataporten defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointOverrides {
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default)]
    pub redeem_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub validate_url: Option<String>,
    #[serde(default)]
    pub groups_url: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Immutable set of provider endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    login: Url,
    redeem: Url,
    profile: Url,
    validate: Url,
    primary_groups: Option<Url>,
    secondary_groups: Option<Url>,
    scope: String,
}

impl ProviderEndpoints {
    /// Resolve the endpoint set.
    ///
    /// The primary group endpoint is only populated when `policy` is
    /// restricted; the secondary one is taken from the policy as-is.
    pub fn resolve(
        overrides: &EndpointOverrides,
        policy: &AuthorizationPolicy,
    ) -> GateResult<Self> {
        let login = url_or_default("login_url", overrides.login_url.as_deref(), DEFAULT_LOGIN_URL)?;
        let redeem =
            url_or_default("redeem_url", overrides.redeem_url.as_deref(), DEFAULT_REDEEM_URL)?;
        let profile =
            url_or_default("profile_url", overrides.profile_url.as_deref(), DEFAULT_PROFILE_URL)?;
        let validate = match non_empty(overrides.validate_url.as_deref()) {
            Some(raw) => parse_url("validate_url", raw)?,
            None => profile.clone(),
        };

        let primary_groups = if policy.is_restricted() {
            Some(url_or_default(
                "groups_url",
                overrides.groups_url.as_deref(),
                DEFAULT_GROUPS_URL,
            )?)
        } else {
            None
        };

        let scope = non_empty(overrides.scope.as_deref())
            .unwrap_or(DEFAULT_SCOPE)
            .to_string();

        Ok(Self {
            login,
            redeem,
            profile,
            validate,
            primary_groups,
            secondary_groups: policy.secondary_endpoint().cloned(),
            scope,
        })
    }

    /// Endpoints with every default applied and group authorization off.
    pub fn dataporten() -> GateResult<Self> {
        Self::resolve(&EndpointOverrides::default(), &AuthorizationPolicy::unrestricted())
    }

    pub fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    pub fn login(&self) -> &Url {
        &self.login
    }

    pub fn redeem(&self) -> &Url {
        &self.redeem
    }

    pub fn profile(&self) -> &Url {
        &self.profile
    }

    pub fn validate(&self) -> &Url {
        &self.validate
    }

    pub fn primary_groups(&self) -> Option<&Url> {
        self.primary_groups.as_ref()
    }

    pub fn secondary_groups(&self) -> Option<&Url> {
        self.secondary_groups.as_ref()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn url_or_default(name: &str, value: Option<&str>, default: &str) -> GateResult<Url> {
    parse_url(name, non_empty(value).unwrap_or(default))
}

fn parse_url(name: &str, raw: &str) -> GateResult<Url> {
    Url::parse(raw).map_err(|e| GateError::config(format!("{} '{}': {}", name, raw, e)))
}
