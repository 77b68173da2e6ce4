use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::endpoints::{EndpointOverrides, ProviderEndpoints};
use crate::fetcher::{AttributeFetcher, DEFAULT_TIMEOUT_SECONDS, FetcherConfig};
use crate::gate::{AuthorizationGate, IdentityClaim};
use crate::policy::{AuthorizationPolicy, MembershipFailureMode};

pub const CONFIG_ENV_VAR: &str = "DATAPORTEN_GATE_CONFIG";

/// Operator configuration, usually read from `dataporten-gate.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    #[serde(default)]
    pub endpoints: EndpointOverrides,
    /// Comma-separated allow-list; empty means every user is allowed
    #[serde(default)]
    pub allowed_groups: String,
    /// Optional second group-membership source
    #[serde(default)]
    pub secondary_groups_url: String,
    #[serde(default)]
    pub identity_claim: IdentityClaim,
    #[serde(default)]
    pub membership_failure_mode: MembershipFailureMode,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            endpoints: EndpointOverrides::default(),
            allowed_groups: String::new(),
            secondary_groups_url: String::new(),
            identity_claim: IdentityClaim::default(),
            membership_failure_mode: MembershipFailureMode::default(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl GateSettings {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let settings: GateSettings = serde_json::from_str(raw)?;
        Ok(settings.expanded())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Self::from_json(&raw)
    }

    pub fn policy(&self) -> AuthorizationPolicy {
        AuthorizationPolicy::configure_authorization(
            &self.allowed_groups,
            &self.secondary_groups_url,
        )
        .with_failure_mode(self.membership_failure_mode)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }

    /// Resolve endpoints and build the gate these settings describe.
    pub fn build_gate(&self) -> anyhow::Result<AuthorizationGate> {
        let policy = self.policy();
        let endpoints = ProviderEndpoints::resolve(&self.endpoints, &policy)?;
        let fetcher = AttributeFetcher::new(&self.fetcher_config())?;
        Ok(AuthorizationGate::new(
            endpoints,
            policy,
            self.identity_claim.clone(),
            fetcher,
        )?)
    }

    fn expanded(mut self) -> Self {
        let e = &mut self.endpoints;
        for url in [
            &mut e.login_url,
            &mut e.redeem_url,
            &mut e.profile_url,
            &mut e.validate_url,
            &mut e.groups_url,
        ]
        .into_iter()
        .flatten()
        {
            *url = expand_env_vars(url);
        }
        self.allowed_groups = expand_env_vars(&self.allowed_groups);
        self.secondary_groups_url = expand_env_vars(&self.secondary_groups_url);
        self
    }
}

/// Locate the settings file.
///
/// Order: `DATAPORTEN_GATE_CONFIG`, `$XDG_CONFIG_HOME/dataporten-gate/config.json`,
/// `./dataporten-gate.json`. Returns `None` when nothing is found.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("dataporten-gate").join("config.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("dataporten-gate.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

/// Load settings from `path`, or from the resolved default location, or
/// fall back to built-in defaults.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<GateSettings> {
    match path.map(Path::to_path_buf).or_else(resolve_config_path) {
        Some(p) => GateSettings::load(&p),
        None => Ok(GateSettings::default()),
    }
}

/// Replace `${NAME}` with the value of environment variable `NAME`.
/// Unknown variables are left untouched.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            match env::var(&name) {
                Ok(val) => out.push_str(&val),
                Err(_) => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateState;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings = GateSettings::from_json("{}").unwrap();
        assert_eq!(settings.allowed_groups, "");
        assert_eq!(settings.identity_claim, IdentityClaim::userid());
        assert_eq!(settings.membership_failure_mode, MembershipFailureMode::FailClosed);
        assert_eq!(settings.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);

        let gate = settings.build_gate().unwrap();
        assert_eq!(gate.state(), &GateState::Unrestricted);
    }

    #[test]
    fn test_full_document() {
        let raw = r#"{
            "endpoints": {
                "profile_url": "https://example.com/userinfo",
                "groups_url": "https://example.com/groups"
            },
            "allowed_groups": "testgroup,NS98237K",
            "secondary_groups_url": "https://mas.example.com/groups",
            "identity_claim": {"container": "user", "field": "email"},
            "membership_failure_mode": "fail_open",
            "timeout_seconds": 3
        }"#;

        let settings = GateSettings::from_json(raw).unwrap();
        assert_eq!(settings.fetcher_config().timeout, Duration::from_secs(3));

        let gate = settings.build_gate().unwrap();
        assert_eq!(gate.claim(), &IdentityClaim::email());
        assert_eq!(gate.policy().failure_mode(), MembershipFailureMode::FailOpen);
        match gate.state() {
            GateState::Restricted { primary, secondary } => {
                assert_eq!(primary.as_str(), "https://example.com/groups");
                assert_eq!(
                    secondary.as_ref().map(|u| u.as_str()),
                    Some("https://mas.example.com/groups")
                );
            }
            other => panic!("expected restricted gate, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_profile_url_fails_build() {
        let raw = r#"{"endpoints": {"profile_url": "not a url"}}"#;
        let settings = GateSettings::from_json(raw).unwrap();
        assert!(settings.build_gate().is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test-only env mutation with a variable no other test reads
        unsafe { env::set_var("DATAPORTEN_GATE_TEST_HOST", "groups.example.org") };

        assert_eq!(
            expand_env_vars("https://${DATAPORTEN_GATE_TEST_HOST}/groups"),
            "https://groups.example.org/groups"
        );
        assert_eq!(
            expand_env_vars("https://${DATAPORTEN_GATE_UNSET_VAR}/groups"),
            "https://${DATAPORTEN_GATE_UNSET_VAR}/groups"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"allowed_groups": "testgroup"}}"#).unwrap();

        let settings = load_settings(Some(file.path())).unwrap();
        assert_eq!(settings.allowed_groups, "testgroup");
        assert!(settings.policy().is_restricted());
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(load_settings(Some(&missing)).is_err());
    }
}
