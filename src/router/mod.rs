//! The shared HTTP router: one server hosting every deployed API.
//!
//! Each API is registered as a nested sub-router under its effective base
//! path, with one route per resource. Requests are converted to message
//! contexts, run through the resource's mediation, and the outcome mapped
//! back: 200 with payload when a respond mediator fired, 202 when mediation
//! succeeded silently, 400 for query-parameter violations, 500 for mediation
//! failure.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, RawQuery};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, get, on};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::artifacts::{Api, Resource};
use crate::mediation::MediationContext;
use crate::message::{MessageContext, PROP_QUERY_PARAMS, PROP_URI_PARAMS};

pub mod cors;
pub mod openapi;

/// Bounded drain window for the HTTP server at shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("an API with base path '{path}' is already registered")]
    DuplicateBasePath { path: String },

    #[error("failed to register routes for API {api}: {reason}")]
    Registration { api: String, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Accumulates API routes and serves them on one listener.
pub struct RouterService {
    hostname: String,
    port: u16,
    ctx: MediationContext,
    router: Router,
    base_paths: HashSet<String>,
}

impl RouterService {
    pub fn new(hostname: String, port: u16, ctx: MediationContext) -> Self {
        let router = Router::new().route("/livez", get(livez));
        Self {
            hostname,
            port,
            ctx,
            router,
            base_paths: HashSet::new(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Register every resource of an API plus its OpenAPI discovery route.
    ///
    /// Two APIs must not collide on the same effective base path.
    pub fn register_api(&mut self, api: Arc<Api>) -> Result<(), RouterError> {
        let base_path = api.base_path();
        if !self.base_paths.insert(base_path.clone()) {
            return Err(RouterError::DuplicateBasePath { path: base_path });
        }

        let mut api_router = Router::new();
        for resource in &api.resources {
            let Some(filter) = method_filter(&resource.methods) else {
                continue;
            };
            let path = route_path(resource);
            let handler = resource_handler(Arc::new(resource.clone()), self.ctx.clone());

            let built = std::panic::catch_unwind(AssertUnwindSafe(|| {
                api_router.clone().route(&path, on(filter, handler))
            }))
            .map_err(|_| RouterError::Registration {
                api: api.name.clone(),
                reason: format!("conflicting route '{path}'"),
            })?;
            api_router = built;

            info!(
                target: "flowgate::router",
                api_name = %api.name,
                pattern = %format!("{} {base_path}{path}", resource.methods.join(" ")),
                "registered route for API"
            );
        }

        if api.cors.enabled {
            api_router = api_router.layer(cors::layer(&api.cors));
        }

        let swagger = swagger_handler(Arc::clone(&api), self.hostname.clone(), self.port);
        let swagger_path = api.swagger_path();

        let root = std::mem::replace(&mut self.router, Router::new());
        let mounted = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let with_api = if base_path == "/" || base_path.is_empty() {
                root.clone().merge(api_router.clone())
            } else {
                root.clone().nest(&base_path, api_router.clone())
            };
            with_api.route(&swagger_path, get(swagger))
        }));
        match mounted {
            Ok(router) => {
                self.router = router;
                Ok(())
            }
            Err(_) => {
                self.router = root;
                self.base_paths.remove(&base_path);
                Err(RouterError::Registration {
                    api: api.name.clone(),
                    reason: format!("cannot mount API at '{base_path}'"),
                })
            }
        }
    }

    /// The assembled router, for in-process testing without a listener.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Bind the listener and serve in a background task.
    ///
    /// The task stops accepting connections when the lifecycle token is
    /// cancelled and drains in-flight connections within
    /// [`SHUTDOWN_TIMEOUT`].
    pub async fn bind(self, lifecycle: crate::lifecycle::Lifecycle) -> Result<RouterHandle, RouterError> {
        let addr = format!("{}:{}", self.hostname, self.port);
        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|source| RouterError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
        let local_addr = listener.local_addr().map_err(|source| RouterError::Bind {
            addr: addr.clone(),
            source,
        })?;

        info!(target: "flowgate::router", address = %local_addr, "starting HTTP server");

        let token = lifecycle.token();
        let app = self.router;
        let join = tokio::spawn(async move {
            let shutdown_token = token.clone();
            let serve = async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown_token.cancelled().await;
                    })
                    .await
            };

            tokio::select! {
                result = serve => {
                    if let Err(err) = result {
                        error!(target: "flowgate::router", error = %err, "HTTP server error");
                    }
                }
                _ = async {
                    token.cancelled().await;
                    tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
                } => {
                    warn!(target: "flowgate::router", "HTTP server drain timeout exceeded, forcing stop");
                }
            }
            info!(target: "flowgate::router", "HTTP server stopped serving new connections");
        });

        Ok(RouterHandle { join, local_addr })
    }
}

/// Handle to the running HTTP server task.
pub struct RouterHandle {
    join: tokio::task::JoinHandle<()>,
    local_addr: std::net::SocketAddr,
}

impl RouterHandle {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Wait for the server task to finish its (bounded) drain.
    pub async fn shutdown(self) {
        let _ = self.join.await;
    }
}

fn route_path(resource: &Resource) -> String {
    let template = &resource.uri_template.path_template;
    if template.is_empty() {
        "/".to_string()
    } else if template.starts_with('/') {
        template.clone()
    } else {
        format!("/{template}")
    }
}

fn method_filter(methods: &[String]) -> Option<MethodFilter> {
    let mut filter: Option<MethodFilter> = None;
    for method in methods {
        let next = match method.as_str() {
            "GET" => MethodFilter::GET,
            "POST" => MethodFilter::POST,
            "PUT" => MethodFilter::PUT,
            "DELETE" => MethodFilter::DELETE,
            "PATCH" => MethodFilter::PATCH,
            "HEAD" => MethodFilter::HEAD,
            "OPTIONS" => MethodFilter::OPTIONS,
            _ => continue,
        };
        filter = Some(match filter {
            Some(existing) => existing.or(next),
            None => next,
        });
    }
    filter
}

fn resource_handler(
    resource: Arc<Resource>,
    ctx: MediationContext,
) -> impl Fn(
    UrlPath<HashMap<String, String>>,
    RawQuery,
    HeaderMap,
    Bytes,
) -> std::pin::Pin<Box<dyn Future<Output = Response> + Send>>
+ Clone
+ Send
+ Sync
+ 'static {
    move |UrlPath(params), RawQuery(query), headers, body| {
        let resource = Arc::clone(&resource);
        let ctx = ctx.clone();
        Box::pin(async move { handle_resource(resource, ctx, params, query, headers, body).await })
    }
}

/// Per-request pipeline: validate query parameters, build the message
/// context, run mediation, map the outcome to an HTTP response.
async fn handle_resource(
    resource: Arc<Resource>,
    ctx: MediationContext,
    params: HashMap<String, String>,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let declared = &resource.uri_template.query_parameters;
    let request_pairs: Vec<(String, String)> = query
        .as_deref()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    // Query validation only applies when the resource declares query
    // variables; otherwise any query string is accepted.
    if !declared.is_empty() {
        for (key, _) in &request_pairs {
            if !declared.contains_key(key) {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("Unsupported query parameter: {key}"),
                )
                    .into_response();
            }
        }
        for key in declared.keys() {
            if !request_pairs.iter().any(|(k, _)| k == key) {
                return (
                    StatusCode::BAD_REQUEST,
                    format!("Missing required query parameter: {key}"),
                )
                    .into_response();
            }
        }
    }

    let mut msg = MessageContext::new();
    msg.message.raw_payload = body;
    msg.message.content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let uri_params: HashMap<String, String> = resource
        .uri_template
        .path_parameters
        .iter()
        .filter_map(|name| params.get(name).map(|value| (name.clone(), value.clone())))
        .collect();
    msg.set_string_map(PROP_URI_PARAMS, uri_params);

    if !declared.is_empty() {
        let mut query_vars = HashMap::new();
        for (key, variable) in declared {
            if let Some((_, value)) = request_pairs.iter().find(|(k, _)| k == key) {
                query_vars.insert(variable.clone(), value.clone());
            }
        }
        msg.set_string_map(PROP_QUERY_PARAMS, query_vars);
    }

    if !resource.mediate(&mut msg, &ctx).await {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
    }

    let responded = msg.is_response_marked();
    let mut response = if responded {
        (StatusCode::OK, msg.message.raw_payload.clone()).into_response()
    } else {
        StatusCode::ACCEPTED.into_response()
    };

    for (name, value) in &msg.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(target: "flowgate::router", header = %name, "dropping invalid response header"),
        }
    }
    if responded && !msg.message.content_type.is_empty() {
        if let Ok(value) = HeaderValue::try_from(msg.message.content_type.as_str()) {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
    }

    response
}

/// `GET /livez` liveness probe.
async fn livez() -> Response {
    let body = serde_json::json!({
        "status": "UP",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn swagger_handler(
    api: Arc<Api>,
    hostname: String,
    port: u16,
) -> impl Fn(RawQuery) -> std::pin::Pin<Box<dyn Future<Output = Response> + Send>>
+ Clone
+ Send
+ Sync
+ 'static {
    move |RawQuery(query)| {
        let api = Arc::clone(&api);
        let hostname = hostname.clone();
        Box::pin(async move { serve_swagger(&api, &hostname, port, query.as_deref()) })
    }
}

/// Answer `?swagger.yaml` / `?swagger.json` discovery queries.
fn serve_swagger(api: &Api, hostname: &str, port: u16, query: Option<&str>) -> Response {
    let keys: HashSet<String> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, _)| k.into_owned())
                .collect()
        })
        .unwrap_or_default();

    if keys.contains("swagger.yaml") {
        let spec = openapi::generate(api, hostname, port);
        return match serde_yaml::to_string(&spec) {
            Ok(yaml) => (
                StatusCode::OK,
                [(CONTENT_TYPE, "application/yaml; charset=utf-8")],
                yaml,
            )
                .into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to marshal spec to YAML: {err}"),
            )
                .into_response(),
        };
    }

    if keys.contains("swagger.json") {
        let spec = openapi::generate(api, hostname, port);
        return match serde_json::to_string_pretty(&spec) {
            Ok(json) => (
                StatusCode::OK,
                [(CONTENT_TYPE, "application/json; charset=utf-8")],
                json,
            )
                .into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to write JSON response: {err}"),
            )
                .into_response(),
        };
    }

    StatusCode::NOT_FOUND.into_response()
}
