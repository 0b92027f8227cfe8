//! Common test utilities

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use lending_server::{
    api,
    config::AppConfig,
    models::{Role, UserClaims},
    repository::{memory::MemoryStore, Repository},
    services::Services,
    AppState,
};

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    secret: String,
}

/// Router over a fresh in-memory store with default configuration
pub fn spawn_app() -> TestApp {
    let config = AppConfig::default();
    let store = MemoryStore::new();
    let services = Services::new(Repository::in_memory(store.clone()), &config.lending);
    let secret = config.auth.jwt_secret.clone();

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    TestApp {
        router: api::router(state),
        store,
        secret,
    }
}

impl TestApp {
    pub fn token(&self, role: Role) -> String {
        let now = chrono::Utc::now().timestamp();
        UserClaims {
            sub: format!("{}@library.test", role.as_str().to_lowercase()),
            user_id: 1,
            role,
            exp: now + 3600,
            iat: now,
        }
        .create_token(&self.secret)
        .expect("Failed to sign test token")
    }

    /// Send a request, returning the status and the JSON body (`Null` when empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();

        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
