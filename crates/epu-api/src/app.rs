use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/domains", post(handlers::add_domain).get(handlers::list_domains))
        .route("/domains/:domain_id", get(handlers::describe_domain).delete(handlers::remove_domain))
        .route("/domains/:domain_id/config", put(handlers::reconfigure_domain))
        .route("/domains/:domain_id/subscribers", post(handlers::subscribe_domain))
        .route("/domains/:domain_id/subscribers/:name", axum::routing::delete(handlers::unsubscribe_domain))
        .route(
            "/domain-definitions",
            post(handlers::add_domain_definition).get(handlers::list_domain_definitions),
        )
        .route(
            "/domain-definitions/:id",
            get(handlers::describe_domain_definition)
                .delete(handlers::remove_domain_definition)
                .put(handlers::update_domain_definition),
        )
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/sensor-info", post(handlers::sensor_info))
        .route("/instance-info", post(handlers::instance_info))
        .route("/provision", post(handlers::provision))
        .route("/terminate-nodes", post(handlers::terminate_nodes))
        .route("/terminate-launches", post(handlers::terminate_launches))
        .route("/terminate-all", post(handlers::terminate_all).get(handlers::check_terminate_all))
        .route("/dump-state", post(handlers::dump_state))
        .route("/readyz", get(handlers::readyz))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use epu_controller::{DecisionEngine, EngineRegistry, FixedSizeEngine};
    use epu_domain::Site;
    use epu_iaas::{DriverRegistry, MockDriver};
    use epu_management::EpuManagement;
    use epu_provisioner::{DeployableType, MockBroker, NoopNotifier, Provisioner, StaticDtrs};
    use epu_store::InMemoryStore;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token";

    async fn test_app() -> Router {
        let store: Arc<dyn epu_store::StateStore> = Arc::new(InMemoryStore::new());
        let driver = Arc::new(MockDriver::new());
        let mut registry = DriverRegistry::new();
        registry.register(Site("local".into()), driver);
        let dtrs = Arc::new(StaticDtrs::new());
        dtrs.register(
            "worker-dt",
            DeployableType {
                document: r#"<cluster><workspace><name>worker</name><image>i</image><quantity>1</quantity><ctx>c</ctx></workspace></cluster>"#.into(),
                vars: HashMap::new(),
            },
        )
        .await;
        let provisioner = Arc::new(Provisioner::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(MockBroker::new()),
            dtrs,
            Arc::new(NoopNotifier),
        ));
        let mut engines = EngineRegistry::new();
        engines.register("fixed-size", Arc::new(|| Box::new(FixedSizeEngine::new()) as Box<dyn DecisionEngine>));
        let management = Arc::new(EpuManagement::new(store.clone(), provisioner.clone(), Arc::new(engines), None));

        let state = AppState { store, provisioner, management, auth_token: Arc::new(TEST_TOKEN.to_string()) };
        build_app(state)
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_TOKEN))
    }

    #[tokio::test]
    async fn unauthenticated_request_returns_401() {
        let app = test_app().await;
        let resp = app.oneshot(Request::builder().uri("/domains").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn healthz_requires_no_auth() {
        let app = test_app().await;
        let resp = app.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_returns_200() {
        let app = test_app().await;
        let resp = app
            .oneshot(authed(Request::builder().uri("/readyz")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_requires_auth() {
        let app = test_app().await;
        let resp = app.oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_domains_empty() {
        let app = test_app().await;
        let resp = app
            .oneshot(authed(Request::builder().uri("/domains")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn describe_unknown_domain_returns_404() {
        let app = test_app().await;
        let resp = app
            .oneshot(authed(Request::builder().uri("/domains/nonexistent")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
