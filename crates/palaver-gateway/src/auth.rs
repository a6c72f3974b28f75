// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token middleware for the admin API.
//!
//! When no token is configured every admin request is rejected (fail-closed).

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Authentication configuration for `/admin/*`.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected bearer token. `None` disables the admin API.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Middleware that validates `Authorization: Bearer <token>`.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(ref expected_token) = auth.bearer_token else {
        tracing::error!("admin API has no bearer token configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == expected_token => Ok(next.run(request).await),
        _ => {
            tracing::debug!(path = %request.uri().path(), "admin request rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    fn app(token: Option<&str>) -> Router {
        let auth = AuthConfig {
            bearer_token: token.map(str::to_string),
        };
        Router::new()
            .route("/admin/ping", get(|| async { "pong" }))
            .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
    }

    async fn status(app: Router, header: Option<&str>) -> StatusCode {
        let mut request = Request::builder().uri("/admin/ping");
        if let Some(value) = header {
            request = request.header("authorization", value);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn valid_token_passes() {
        assert_eq!(
            status(app(Some("s3cret")), Some("Bearer s3cret")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn wrong_or_missing_token_is_rejected() {
        assert_eq!(
            status(app(Some("s3cret")), Some("Bearer nope")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(app(Some("s3cret")), None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(app(Some("s3cret")), Some("s3cret")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn unconfigured_token_fails_closed() {
        assert_eq!(
            status(app(None), Some("Bearer anything")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn debug_redacts_token() {
        let config = AuthConfig {
            bearer_token: Some("s3cret".to_string()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[redacted]"));
    }
}
