//! Per-API CORS middleware built from the artifact's [`CorsConfig`].

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::artifacts::CorsConfig;

/// Build a `tower-http` CORS layer for one API.
///
/// Origin matching is delegated to [`CorsConfig::is_origin_allowed`] through
/// a predicate so subdomain wildcards (`*.example.com`) behave the same for
/// preflight and actual requests, with or without credentials.
pub fn layer(config: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = config
        .allow_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let allow_headers: Vec<HeaderName> = config
        .allow_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    let expose_headers: Vec<HeaderName> = config
        .expose_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let origin_config = config.clone();
    let mut layer = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| origin_config.is_origin_allowed(o))
                .unwrap_or(false)
        }))
        .allow_methods(methods)
        .allow_headers(allow_headers)
        .max_age(Duration::from_secs(config.max_age_secs));

    if !expose_headers.is_empty() {
        layer = layer.expose_headers(expose_headers);
    }
    if config.allow_credentials {
        layer = layer.allow_credentials(true);
    }
    layer
}
