//! Group-based authorization policy.
//!
//! A policy is a value object: it is built once from operator
//! configuration and never changes afterwards. Reconfiguring means building
//! a new policy and a new gate around it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::error::{GateError, GateResult};
use crate::types::GroupId;

/// What a failed group-membership fetch means for the decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipFailureMode {
    /// Propagate the fetch error; the login is refused.
    #[default]
    FailClosed,
    /// Log the error and treat the source as reporting no groups.
    FailOpen,
}

/// Set of allowed groups plus the optional secondary membership source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    allowed_groups: HashSet<GroupId>,
    secondary_endpoint: Option<Url>,
    failure_mode: MembershipFailureMode,
}

impl AuthorizationPolicy {
    /// A policy that authorizes every authenticated token.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Build a policy from a comma-separated allow-list and an optional
    /// secondary group endpoint.
    ///
    /// An empty allow-list yields an unrestricted policy and the secondary
    /// endpoint is ignored. Entries are compared verbatim, so `"a, b"`
    /// allows `"a"` and `" b"`. A malformed secondary URL is logged and the
    /// secondary source stays unset.
    pub fn configure_authorization(
        allowed_groups_csv: &str,
        secondary_group_endpoint: &str,
    ) -> Self {
        if allowed_groups_csv.is_empty() {
            return Self::unrestricted();
        }

        let allowed_groups = allowed_groups_csv.split(',').map(GroupId::new).collect();

        let secondary_endpoint = match Self::try_secondary_endpoint(secondary_group_endpoint) {
            Ok(url) => url,
            Err(e) => {
                warn!("Ignoring secondary group endpoint: {}", e);
                None
            }
        };

        Self {
            allowed_groups,
            secondary_endpoint,
            failure_mode: MembershipFailureMode::default(),
        }
    }

    /// Parse a secondary group endpoint. Empty input means "not configured".
    pub fn try_secondary_endpoint(raw: &str) -> GateResult<Option<Url>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Url::parse(raw)
            .map(Some)
            .map_err(|e| GateError::config(format!("secondary group endpoint '{}': {}", raw, e)))
    }

    pub fn with_failure_mode(mut self, mode: MembershipFailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// True iff at least one allowed group is configured.
    pub fn is_restricted(&self) -> bool {
        !self.allowed_groups.is_empty()
    }

    pub fn allows(&self, group: &str) -> bool {
        self.allowed_groups.contains(group)
    }

    /// True iff any of `groups` is in the allow-list.
    pub fn admits<'a>(&self, groups: impl IntoIterator<Item = &'a GroupId>) -> bool {
        groups.into_iter().any(|g| self.allows(g.as_str()))
    }

    pub fn allowed_groups(&self) -> impl Iterator<Item = &GroupId> {
        self.allowed_groups.iter()
    }

    pub fn secondary_endpoint(&self) -> Option<&Url> {
        self.secondary_endpoint.as_ref()
    }

    pub fn failure_mode(&self) -> MembershipFailureMode {
        self.failure_mode
    }
}
