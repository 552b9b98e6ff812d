use serde::{Deserialize, Deserializer};

/// Default path at which the exposition endpoint is installed.
pub const DEFAULT_METRICS_PATH: &str = "/-/metrics";

/// Default request-level exclusion patterns: the web UI root, the health
/// endpoint, static/UI asset paths and icon requests.
pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "^/$",
    "^/[-]/ping",
    "^/[-]/(static|registry|web)",
    "[.]ico$",
];

pub const DEFAULT_METRIC_NAME_REQUESTS: &str = "registry_http_requests";
pub const DEFAULT_METRIC_NAME_PACKAGE_DOWNLOADS: &str = "registry_package_downloads";

/// Plugin configuration as supplied by the host registry's config file.
/// Every field is optional; an empty configuration disables all collection.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsConfig {
    pub metrics_path: Option<String>,
    pub default_metrics: Option<ToggleConfig>,
    pub request_metrics: Option<RequestMetricsConfig>,
    pub package_metrics: Option<PackageMetricsConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToggleConfig {
    #[serde(deserialize_with = "bool_or_string")]
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestMetricsConfig {
    #[serde(deserialize_with = "bool_or_string")]
    pub enabled: bool,
    pub metric_name: Option<String>,
    /// Ordered exclusion patterns; replaces the built-in defaults when set.
    pub path_exclusions: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageMetricsConfig {
    #[serde(deserialize_with = "bool_or_string")]
    pub enabled: bool,
    pub metric_name: Option<String>,
    /// Ordered grouping rules; first match wins, so a catch-all belongs last.
    pub package_groups: Vec<PackageGroup>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageGroup {
    pub pattern: String,
    pub group: String,
}

impl MetricsConfig {
    pub fn metrics_path(&self) -> &str {
        self.metrics_path.as_deref().unwrap_or(DEFAULT_METRICS_PATH)
    }

    pub fn default_metrics_enabled(&self) -> bool {
        self.default_metrics.as_ref().is_some_and(|t| t.enabled)
    }

    pub fn request_metrics_enabled(&self) -> bool {
        self.request_metrics.as_ref().is_some_and(|r| r.enabled)
    }

    pub fn package_metrics_enabled(&self) -> bool {
        self.package_metrics.as_ref().is_some_and(|p| p.enabled)
    }

    pub fn request_metric_name(&self) -> &str {
        self.request_metrics
            .as_ref()
            .and_then(|r| r.metric_name.as_deref())
            .unwrap_or(DEFAULT_METRIC_NAME_REQUESTS)
    }

    pub fn package_metric_name(&self) -> &str {
        self.package_metrics
            .as_ref()
            .and_then(|p| p.metric_name.as_deref())
            .unwrap_or(DEFAULT_METRIC_NAME_PACKAGE_DOWNLOADS)
    }

    /// Configured exclusion patterns, or the built-in defaults.
    pub fn path_exclusions(&self) -> Vec<String> {
        match self
            .request_metrics
            .as_ref()
            .and_then(|r| r.path_exclusions.as_ref())
        {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_EXCLUDED_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn package_groups(&self) -> &[PackageGroup] {
        self.package_metrics
            .as_ref()
            .map(|p| p.package_groups.as_slice())
            .unwrap_or_default()
    }
}

/// Registry config files are frequently hand-written YAML where `enabled`
/// shows up as the string `"true"`; accept both forms.
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Text(String),
    }

    Ok(match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => b,
        BoolOrString::Text(s) => s == "true",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults_and_disables_everything() {
        let config: MetricsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.metrics_path(), DEFAULT_METRICS_PATH);
        assert!(!config.default_metrics_enabled());
        assert!(!config.request_metrics_enabled());
        assert!(!config.package_metrics_enabled());
        assert_eq!(config.request_metric_name(), DEFAULT_METRIC_NAME_REQUESTS);
        assert_eq!(
            config.package_metric_name(),
            DEFAULT_METRIC_NAME_PACKAGE_DOWNLOADS
        );
        assert_eq!(config.path_exclusions().len(), DEFAULT_EXCLUDED_PATHS.len());
        assert!(config.package_groups().is_empty());
    }

    #[test]
    fn full_config_deserializes_with_ordered_groups() {
        let config: MetricsConfig = serde_json::from_str(
            r#"{
                "metricsPath": "/custom/metrics",
                "defaultMetrics": { "enabled": true },
                "requestMetrics": {
                    "enabled": "true",
                    "metricName": "my_requests",
                    "pathExclusions": ["^/internal"]
                },
                "packageMetrics": {
                    "enabled": true,
                    "packageGroups": [
                        { "pattern": "@scoped/.*", "group": "scoped" },
                        { "pattern": ".*", "group": "other" }
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.metrics_path(), "/custom/metrics");
        assert!(config.default_metrics_enabled());
        assert!(config.request_metrics_enabled());
        assert_eq!(config.request_metric_name(), "my_requests");
        assert_eq!(config.path_exclusions(), vec!["^/internal".to_string()]);
        let groups = config.package_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group, "scoped");
        assert_eq!(groups[1].group, "other");
    }

    #[test]
    fn enabled_accepts_string_false() {
        let config: MetricsConfig =
            serde_json::from_str(r#"{ "requestMetrics": { "enabled": "false" } }"#).unwrap();
        assert!(!config.request_metrics_enabled());
    }
}
