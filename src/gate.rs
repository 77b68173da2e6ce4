//! Authorization gate.
//!
//! Combines zero, one or two group-membership sources into an allow/deny
//! decision and, when allowed, resolves the identity string from the
//! profile endpoint. The gate is immutable once built; share it with `Arc`
//! across concurrent logins.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::endpoints::ProviderEndpoints;
use crate::error::{GateError, GateResult};
use crate::fetcher::AttributeFetcher;
use crate::policy::{AuthorizationPolicy, MembershipFailureMode};
use crate::types::{AccessToken, GroupId, UserIdentity};

/// Which profile field is returned as the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    /// Nested object holding the field, e.g. "user"
    pub container: String,
    /// Scalar inside the container, e.g. "userid" or "email"
    pub field: String,
}

impl IdentityClaim {
    pub fn new(container: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            field: field.into(),
        }
    }

    /// `user.userid`, the Dataporten user id.
    pub fn userid() -> Self {
        Self::new("user", "userid")
    }

    /// `user.email`, not released for every account.
    pub fn email() -> Self {
        Self::new("user", "email")
    }
}

impl Default for IdentityClaim {
    fn default() -> Self {
        Self::userid()
    }
}

/// Authorization state, fixed when the gate is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Every authenticated token is authorized.
    Unrestricted,
    /// Only members of an allowed group are authorized.
    Restricted {
        primary: Url,
        secondary: Option<Url>,
    },
}

/// The identity-resolution entry point for the login flow.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    endpoints: ProviderEndpoints,
    policy: AuthorizationPolicy,
    claim: IdentityClaim,
    fetcher: AttributeFetcher,
    state: GateState,
}

impl AuthorizationGate {
    /// Build a gate.
    ///
    /// A restricted policy requires `endpoints` to carry a primary group
    /// endpoint; resolve the endpoints with the same policy to get one.
    pub fn new(
        endpoints: ProviderEndpoints,
        policy: AuthorizationPolicy,
        claim: IdentityClaim,
        fetcher: AttributeFetcher,
    ) -> GateResult<Self> {
        let state = if policy.is_restricted() {
            let primary = endpoints.primary_groups().cloned().ok_or_else(|| {
                GateError::config("group authorization enabled but no group endpoint resolved")
            })?;
            GateState::Restricted {
                primary,
                secondary: endpoints.secondary_groups().cloned(),
            }
        } else {
            GateState::Unrestricted
        };

        Ok(Self {
            endpoints,
            policy,
            claim,
            fetcher,
            state,
        })
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    pub fn claim(&self) -> &IdentityClaim {
        &self.claim
    }

    /// Resolve the identity for `token`.
    ///
    /// Returns `NotAuthorized` when the policy is restricted and the token's
    /// principal is in none of the allowed groups. Backend failures are
    /// returned as-is.
    pub async fn resolve_identity(&self, token: &AccessToken) -> GateResult<UserIdentity> {
        if !self.is_member(token).await? {
            return Err(GateError::NotAuthorized);
        }

        let identity = self
            .fetcher
            .fetch_field(
                self.endpoints.profile(),
                token,
                &self.claim.container,
                &self.claim.field,
            )
            .await?;

        Ok(UserIdentity::from(identity))
    }

    /// Whether the token's principal may log in.
    ///
    /// Always true when unrestricted. Otherwise the primary source is asked
    /// first and the secondary source only when the primary grants nothing.
    pub async fn is_member(&self, token: &AccessToken) -> GateResult<bool> {
        let (primary, secondary) = match &self.state {
            GateState::Unrestricted => return Ok(true),
            GateState::Restricted { primary, secondary } => (primary, secondary),
        };

        let groups = self.groups_from(primary, token, "primary").await?;
        if self.policy.admits(&groups) {
            return Ok(true);
        }

        if let Some(secondary) = secondary {
            let groups = self.groups_from(secondary, token, "secondary").await?;
            if self.policy.admits(&groups) {
                return Ok(true);
            }
        }

        debug!("No allowed group in memberships; denying");
        Ok(false)
    }

    /// Union of group identifiers from every configured source, primary
    /// first. Empty when unrestricted.
    pub async fn group_memberships(&self, token: &AccessToken) -> GateResult<Vec<GroupId>> {
        let GateState::Restricted { primary, secondary } = &self.state else {
            return Ok(Vec::new());
        };

        let mut groups = self.groups_from(primary, token, "primary").await?;
        if let Some(secondary) = secondary {
            groups.extend(self.groups_from(secondary, token, "secondary").await?);
        }
        Ok(groups)
    }

    async fn groups_from(
        &self,
        endpoint: &Url,
        token: &AccessToken,
        source: &str,
    ) -> GateResult<Vec<GroupId>> {
        match self.fetcher.fetch_group_identifiers(endpoint, token).await {
            Ok(groups) => {
                debug!("{} group source returned {} groups", source, groups.len());
                Ok(groups)
            }
            Err(e) => match self.policy.failure_mode() {
                MembershipFailureMode::FailClosed => Err(e),
                MembershipFailureMode::FailOpen => {
                    warn!("Failed to fetch {} groups, treating as none: {}", source, e);
                    Ok(Vec::new())
                }
            },
        }
    }
}
