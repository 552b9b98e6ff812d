use axum::{extract::Path, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registry_metrics::{MetricsConfig, MetricsPlugin};

/// Demo registry: a handful of stub package routes with the metrics plugin
/// installed, useful for scraping the endpoint locally.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let use_json = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()) == "json";

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,registry_metrics=debug,tower_http=debug".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    dotenvy::dotenv().ok();

    let config = load_config().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        e
    })?;

    let plugin = MetricsPlugin::new(config).map_err(|e| {
        tracing::error!("Failed to build metrics plugin: {}", e);
        e
    })?;

    let app = plugin
        .install(
            Router::new()
                .route("/-/ping", get(|| async { "{}" }))
                .route("/{package}", get(get_packument))
                .route("/{package}/-/{tarball}", get(get_tarball)),
        )
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind("0.0.0.0:4873").await?;
    tracing::info!("Registry listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Read plugin configuration from the `METRICS_CONFIG` environment variable
/// (JSON); with nothing set, enable both counter kinds.
fn load_config() -> Result<MetricsConfig, serde_json::Error> {
    match std::env::var("METRICS_CONFIG") {
        Ok(raw) => serde_json::from_str(&raw),
        Err(_) => serde_json::from_value(json!({
            "requestMetrics": { "enabled": true },
            "packageMetrics": { "enabled": true },
        })),
    }
}

async fn get_packument(Path(package): Path<String>) -> impl IntoResponse {
    Json(json!({
        "name": package,
        "dist-tags": { "latest": "1.0.0" },
        "versions": {},
    }))
}

async fn get_tarball(Path((package, tarball)): Path<(String, String)>) -> impl IntoResponse {
    tracing::debug!(package, tarball, "serving stub tarball");
    (
        StatusCode::OK,
        [("content-type", "application/octet-stream")],
        vec![0u8; 16],
    )
}
