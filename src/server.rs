// Forward-auth HTTP endpoint for reverse proxies

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::gate::AuthorizationGate;
use crate::types::AccessToken;

/// Response header carrying the resolved identity.
pub const AUTH_USER_HEADER: &str = "x-auth-user";

pub type AppState = Arc<AuthorizationGate>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth", get(authorize))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub async fn serve(gate: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Forward-auth server listening on http://{}", bind);
    axum::serve(listener, create_router(gate)).await?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// `200` with the identity header, `401` without a bearer token, `403` on
/// any gate failure. Error details stay in the log.
async fn authorize(State(gate): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(AccessToken::from_authorization_header)
    else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match gate.resolve_identity(&token).await {
        Ok(identity) => match HeaderValue::from_str(identity.as_str()) {
            Ok(value) => {
                let mut response = StatusCode::OK.into_response();
                response.headers_mut().insert(AUTH_USER_HEADER, value);
                response
            }
            Err(_) => {
                warn!("Resolved identity is not a valid header value");
                StatusCode::FORBIDDEN.into_response()
            }
        },
        Err(e) if e.is_denial() => {
            info!("Login denied: {}", e);
            StatusCode::FORBIDDEN.into_response()
        }
        Err(e) => {
            warn!("Login failed: {}", e);
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{EndpointOverrides, ProviderEndpoints};
    use crate::fetcher::{AttributeFetcher, FetcherConfig};
    use crate::gate::IdentityClaim;
    use crate::policy::AuthorizationPolicy;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn app(server: &MockServer, allowed_groups: &str) -> Router {
        let policy = AuthorizationPolicy::configure_authorization(allowed_groups, "");
        let overrides = EndpointOverrides {
            profile_url: Some(format!("{}/userinfo", server.uri())),
            groups_url: Some(format!("{}/groups/me/groups", server.uri())),
            ..Default::default()
        };
        let endpoints = ProviderEndpoints::resolve(&overrides, &policy).unwrap();
        let fetcher = AttributeFetcher::new(&FetcherConfig::default()).unwrap();
        let gate =
            AuthorizationGate::new(endpoints, policy, IdentityClaim::email(), fetcher).unwrap();
        create_router(Arc::new(gate))
    }

    async fn backend() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"user":{"email":"ola.norman@norge.no"}}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/groups/me/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":"testgroup"}]"#))
            .mount(&server)
            .await;
        server
    }

    fn auth_request(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/auth");
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {}", t));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_authorized_request_gets_identity_header() {
        let server = backend().await;
        let response = app(&server, "testgroup")
            .await
            .oneshot(auth_request(Some("abc")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(AUTH_USER_HEADER).unwrap(),
            "ola.norman@norge.no"
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let server = backend().await;
        let response = app(&server, "").await.oneshot(auth_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_non_member_is_forbidden_without_detail() {
        let server = backend().await;
        let response = app(&server, "testgroup-fail")
            .await
            .oneshot(auth_request(Some("abc")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(AUTH_USER_HEADER).is_none());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let server = backend().await;
        let response = app(&server, "")
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
