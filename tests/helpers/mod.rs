//! Shared fixtures for the integration suites.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use flowgate::artifacts::Position;
use flowgate::deployers::{unmarshal_api, unmarshal_endpoint, unmarshal_sequence};
use flowgate::lifecycle::Lifecycle;
use flowgate::mediation::MediationEngine;
use flowgate::registry::ConfigRegistry;
use flowgate::router::RouterService;

/// A fully wired in-process gateway: the artifact registry plus the
/// assembled axum router (no sockets).
pub struct TestGateway {
    pub registry: Arc<ConfigRegistry>,
    pub router: Router,
}

/// Deploy the given descriptors and assemble the router.
pub fn gateway(apis: &[&str], sequences: &[&str], endpoints: &[&str]) -> TestGateway {
    let registry = Arc::new(ConfigRegistry::new());
    let lifecycle = Lifecycle::new();
    let engine = MediationEngine::new(Arc::clone(&registry), lifecycle.clone());

    let mut service = RouterService::new(
        "localhost".to_string(),
        8290,
        engine.context(lifecycle.token()),
    );

    for xml in sequences {
        let seq = unmarshal_sequence(xml, Position::new("test-seq.xml")).expect("sequence parses");
        registry.register_sequence(seq).expect("sequence registers");
    }
    for xml in endpoints {
        let ep = unmarshal_endpoint(xml, Position::new("test-ep.xml")).expect("endpoint parses");
        registry.register_endpoint(ep).expect("endpoint registers");
    }
    for xml in apis {
        let api = unmarshal_api(xml, Position::new("test-api.xml")).expect("API parses");
        let api = registry.register_api(api).expect("API registers");
        service.register_api(api).expect("API routes register");
    }

    TestGateway {
        registry,
        router: service.into_router(),
    }
}

/// One in-process request against the assembled router.
pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: &str,
) -> (StatusCode, HeaderMap, String) {
    send_with_headers(router, method, uri, body, &[]).await
}

/// Same as [`send`] but with extra request headers.
pub async fn send_with_headers(
    router: &Router,
    method: &str,
    uri: &str,
    body: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Body::from(body.to_string()))
        .expect("request builds");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router responds");

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let body = String::from_utf8_lossy(&bytes).into_owned();

    (status, headers, body)
}
