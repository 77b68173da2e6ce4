//! Identity resolution and group-based authorization for Dataporten logins.
//!
//! Given a bearer token from the upstream OAuth2 exchange, the
//! [`AuthorizationGate`] checks group membership against one or two
//! membership backends and then resolves the user's identity from the
//! profile endpoint.
//!
//! ## Usage
//!
//! ```ignore
//! let settings = load_settings(None)?;
//! let gate = settings.build_gate()?;
//!
//! match gate.resolve_identity(&AccessToken::new(token)).await {
//!     Ok(identity) => start_session(identity),
//!     Err(_) => deny_login(),
//! }
//! ```

mod config;
mod endpoints;
mod error;
mod fetcher;
mod gate;
mod policy;
pub mod server;
mod types;

pub use config::{CONFIG_ENV_VAR, GateSettings, load_settings, resolve_config_path};
pub use endpoints::{
    DEFAULT_GROUPS_URL, DEFAULT_LOGIN_URL, DEFAULT_PROFILE_URL, DEFAULT_REDEEM_URL, DEFAULT_SCOPE,
    EndpointOverrides, PROVIDER_NAME, ProviderEndpoints,
};
pub use error::{GateError, GateResult};
pub use fetcher::{AttributeFetcher, DEFAULT_TIMEOUT_SECONDS, FetcherConfig};
pub use gate::{AuthorizationGate, GateState, IdentityClaim};
pub use policy::{AuthorizationPolicy, MembershipFailureMode};
pub use types::{AccessToken, GroupId, UserIdentity};
