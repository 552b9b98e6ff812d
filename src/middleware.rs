use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, Method},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::decode_path;
use crate::context::RequestMetricContext;
use crate::headers::{derive_client, derive_identity};
use crate::plugin::MetricsPlugin;

static TARBALL_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[.]tgz$").unwrap());

/// Observe every request for the request-level counter.
///
/// Exclusion is decided up front; for observed requests the header facts are
/// captured at arrival, but the counter is not incremented until the
/// response future resolves, because the status code is unknown before
/// then. If the connection is aborted first this future is dropped and no
/// increment occurs, an accepted undercount.
pub async fn collect_request_metrics(
    State(plugin): State<Arc<MetricsPlugin>>,
    request: Request,
    next: Next,
) -> Response {
    let decoded_path = decode_path(request.uri().path()).into_owned();
    if plugin.exclusions().is_excluded(&decoded_path) {
        tracing::trace!(decoded_path, "path is excluded from request metrics");
        return next.run(request).await;
    }

    let context = request_metadata(&request, decoded_path, None);
    let response = next.run(request).await;

    let labels = context.finalize_request(response.status());
    tracing::info!(
        metrics_type = "request",
        http_method = %labels.http_method,
        username = %labels.username,
        user_agent_name = %labels.user_agent_name,
        status_code = labels.status_code,
        "request metrics collected"
    );
    plugin.sink().increment_request(&labels);
    response
}

/// Observe package tarball downloads for the package-download counter.
///
/// Only `GET` requests for a tarball path are observed; everything else
/// passes through before any header parsing happens.
pub async fn collect_package_metrics(
    State(plugin): State<Arc<MetricsPlugin>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }
    let decoded_path = decode_path(request.uri().path()).into_owned();
    if !TARBALL_PATH.is_match(&decoded_path) {
        return next.run(request).await;
    }

    let package_group = plugin
        .package_groups()
        .classify(&decoded_path)
        .map(str::to_string);
    let context = request_metadata(&request, decoded_path, package_group);
    let response = next.run(request).await;

    let labels = context.finalize_package(response.status());
    tracing::info!(
        metrics_type = "package",
        username = %labels.username,
        user_agent_name = %labels.user_agent_name,
        status_code = labels.status_code,
        package_group = labels.package_group.as_deref(),
        "package metrics collected"
    );
    plugin.sink().increment_package(&labels);
    response
}

/// Capture the arrival-time facts for one observed request. Header parsing
/// is best effort; malformed values degrade to `UNKNOWN` and never affect
/// the request itself.
fn request_metadata(
    request: &Request,
    decoded_path: String,
    package_group: Option<String>,
) -> RequestMetricContext {
    let identity = derive_identity(header_str(request, header::AUTHORIZATION));
    let client = derive_client(header_str(request, header::USER_AGENT));
    tracing::debug!(
        decoded_path,
        auth_scheme = identity.scheme.as_str(),
        agent_version = client.version.as_deref(),
        "captured request metadata"
    );

    RequestMetricContext {
        http_method: request.method().to_string(),
        decoded_path,
        identity,
        client,
        package_group,
    }
}

fn header_str<'a>(request: &'a Request, name: HeaderName) -> Option<&'a str> {
    request.headers().get(name).and_then(|value| value.to_str().ok())
}
