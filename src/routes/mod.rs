pub mod admin;
pub mod auth;
pub mod waitlist;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let auth_limit = middleware::from_fn_with_state(state.clone(), auth::limit_auth);

    Router::new()
        // Public
        .route("/api/waitlist/register", post(waitlist::register))
        .route("/api/waitlist/count", get(waitlist::count))
        // Admin session
        .route("/api/admin/setup", post(admin::setup).layer(auth_limit.clone()))
        .route("/api/admin/login", post(admin::login).layer(auth_limit))
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/me", get(admin::me))
        // Admin waitlist management
        .route("/api/admin/waitlist", get(admin::list_waitlist))
        .route("/api/admin/waitlist/{id}", delete(admin::delete_waitlist_entry))
        .route("/api/admin/export", get(admin::export_waitlist))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        // State
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::{
        body::{Body, Bytes},
        http::{HeaderMap, Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::db;
    use crate::session::{SessionRegistry, DEFAULT_TTL_HOURS};
    use crate::state::AppState;
    use crate::storage::{SeaStorage, Storage};

    pub struct TestApp {
        pub router: Router,
        pub state: AppState,
    }

    impl TestApp {
        pub async fn new() -> Self {
            Self::build(chrono::Duration::hours(DEFAULT_TTL_HOURS), None).await
        }

        pub async fn with_session_ttl(ttl: chrono::Duration) -> Self {
            Self::build(ttl, None).await
        }

        pub async fn with_setup_key(key: &str) -> Self {
            Self::build(chrono::Duration::hours(DEFAULT_TTL_HOURS), Some(key.to_string())).await
        }

        /// App over a caller-supplied storage backend.
        pub fn with_storage(storage: Arc<dyn Storage>) -> Self {
            Self::assemble(
                storage,
                chrono::Duration::hours(DEFAULT_TTL_HOURS),
                None,
            )
        }

        async fn build(ttl: chrono::Duration, setup_key: Option<String>) -> Self {
            let db = db::init_memory().await.unwrap();
            Self::assemble(Arc::new(SeaStorage::new(db)), ttl, setup_key)
        }

        fn assemble(
            storage: Arc<dyn Storage>,
            ttl: chrono::Duration,
            setup_key: Option<String>,
        ) -> Self {
            let state = AppState::new(storage, SessionRegistry::in_memory(ttl), 1000, setup_key);
            Self {
                router: super::router(state.clone()),
                state,
            }
        }
    }

    pub async fn send_raw(
        router: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes)
    }

    /// Like [`send_raw`] but parses the body as JSON (`Null` when empty).
    pub async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = send_raw(router, method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
