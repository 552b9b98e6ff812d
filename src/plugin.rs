use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::classify::{ExclusionRules, GroupRules};
use crate::config::MetricsConfig;
use crate::error::MetricsError;
use crate::middleware::{collect_package_metrics, collect_request_metrics};
use crate::sink::{MetricsSink, SinkOptions, CONTENT_TYPE_METRICS};

/// The metrics middleware plugin. Constructed once from validated
/// configuration, then installed into the host router with
/// [`MetricsPlugin::install`]. Each instance owns its own counters, so no
/// global registry of plugin instances exists.
pub struct MetricsPlugin {
    metrics_path: String,
    default_metrics_enabled: bool,
    request_metrics_enabled: bool,
    package_metrics_enabled: bool,
    path_exclusions: ExclusionRules,
    package_groups: GroupRules,
    sink: MetricsSink,
}

impl MetricsPlugin {
    /// Build the plugin, compiling all configured patterns. Invalid
    /// patterns and counter-name collisions fail here, before any request
    /// is accepted.
    pub fn new(config: MetricsConfig) -> Result<Self, MetricsError> {
        let metrics_path = config.metrics_path().to_string();
        // Router::route rejects relative paths; surface that here with the
        // other configuration errors instead of panicking in install.
        if !metrics_path.starts_with('/') {
            return Err(MetricsError::InvalidMetricsPath(metrics_path));
        }
        let request_metrics_enabled = config.request_metrics_enabled();
        let package_metrics_enabled = config.package_metrics_enabled();

        if request_metrics_enabled
            && package_metrics_enabled
            && config.request_metric_name() == config.package_metric_name()
        {
            return Err(MetricsError::DuplicateMetricName(
                config.request_metric_name().to_string(),
            ));
        }

        // The endpoint's own scrape traffic is never counted.
        let mut exclusion_patterns = config.path_exclusions();
        exclusion_patterns.push(format!("^{}$", regex::escape(&metrics_path)));
        let path_exclusions = ExclusionRules::compile(&exclusion_patterns)?;

        let package_groups = GroupRules::compile(
            config
                .package_groups()
                .iter()
                .map(|rule| (rule.pattern.as_str(), rule.group.clone())),
        )?;

        let sink = MetricsSink::new(SinkOptions {
            request_metric: request_metrics_enabled
                .then(|| config.request_metric_name().to_string()),
            package_metric: package_metrics_enabled
                .then(|| config.package_metric_name().to_string()),
        });

        Ok(MetricsPlugin {
            metrics_path,
            default_metrics_enabled: config.default_metrics_enabled(),
            request_metrics_enabled,
            package_metrics_enabled,
            path_exclusions,
            package_groups,
            sink,
        })
    }

    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }

    pub(crate) fn exclusions(&self) -> &ExclusionRules {
        &self.path_exclusions
    }

    pub(crate) fn package_groups(&self) -> &GroupRules {
        &self.package_groups
    }

    pub(crate) fn sink(&self) -> &MetricsSink {
        &self.sink
    }

    /// Install the exposition endpoint and the enabled collection
    /// middlewares into the host router. With nothing enabled the router is
    /// returned unchanged.
    pub fn install(self, router: Router) -> Router {
        if !(self.default_metrics_enabled
            || self.request_metrics_enabled
            || self.package_metrics_enabled)
        {
            tracing::warn!("metrics are disabled; endpoint not installed");
            return router;
        }

        let plugin = Arc::new(self);
        tracing::info!(
            metrics_path = %plugin.metrics_path,
            request_metrics = plugin.request_metrics_enabled,
            package_metrics = plugin.package_metrics_enabled,
            default_metrics = plugin.default_metrics_enabled,
            "metrics are enabled and exposed"
        );

        let mut router = router.merge(
            Router::new()
                .route(&plugin.metrics_path, get(serve_metrics))
                .with_state(plugin.clone()),
        );
        if plugin.package_metrics_enabled {
            router = router.layer(middleware::from_fn_with_state(
                plugin.clone(),
                collect_package_metrics,
            ));
        }
        if plugin.request_metrics_enabled {
            router = router.layer(middleware::from_fn_with_state(
                plugin.clone(),
                collect_request_metrics,
            ));
        }
        router
    }
}

async fn serve_metrics(State(plugin): State<Arc<MetricsPlugin>>) -> impl IntoResponse {
    tracing::debug!("providing metrics response");
    (
        [(header::CONTENT_TYPE, CONTENT_TYPE_METRICS)],
        plugin.sink.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PackageGroup, PackageMetricsConfig, RequestMetricsConfig};

    #[test]
    fn invalid_exclusion_pattern_fails_at_construction() {
        let config = MetricsConfig {
            request_metrics: Some(RequestMetricsConfig {
                enabled: true,
                path_exclusions: Some(vec!["*[".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            MetricsPlugin::new(config),
            Err(MetricsError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn invalid_group_pattern_fails_at_construction() {
        let config = MetricsConfig {
            package_metrics: Some(PackageMetricsConfig {
                enabled: true,
                package_groups: vec![PackageGroup {
                    pattern: "(unclosed".to_string(),
                    group: "broken".to_string(),
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            MetricsPlugin::new(config),
            Err(MetricsError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn colliding_counter_names_fail_at_construction() {
        let config = MetricsConfig {
            request_metrics: Some(RequestMetricsConfig {
                enabled: true,
                metric_name: Some("registry_events".to_string()),
                ..Default::default()
            }),
            package_metrics: Some(PackageMetricsConfig {
                enabled: true,
                metric_name: Some("registry_events".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            MetricsPlugin::new(config),
            Err(MetricsError::DuplicateMetricName(name)) if name == "registry_events"
        ));
    }

    #[test]
    fn relative_metrics_path_fails_at_construction() {
        let config = MetricsConfig {
            metrics_path: Some("metrics".to_string()),
            request_metrics: Some(RequestMetricsConfig {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            MetricsPlugin::new(config),
            Err(MetricsError::InvalidMetricsPath(path)) if path == "metrics"
        ));
    }

    #[test]
    fn metrics_path_is_appended_to_exclusions() {
        let config = MetricsConfig {
            request_metrics: Some(RequestMetricsConfig {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let plugin = MetricsPlugin::new(config).unwrap();
        assert!(plugin.exclusions().is_excluded("/-/metrics"));
        assert!(!plugin.exclusions().is_excluded("/-/metrics/other"));
    }
}
