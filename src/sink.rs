use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::context::{PackageLabels, RequestLabels};

/// Content type of the Prometheus text exposition format.
pub const CONTENT_TYPE_METRICS: &str = "text/plain; version=0.0.4; charset=utf-8";

const HELP_REQUESTS: &str = "Count of HTTP requests made to the registry";
const HELP_PACKAGE_DOWNLOADS: &str = "Count of package downloads from the registry";

/// Which counters a [`MetricsSink`] owns. An unset name disables that
/// metric kind entirely; there is no per-request toggling.
#[derive(Clone, Debug, Default)]
pub struct SinkOptions {
    pub request_metric: Option<String>,
    pub package_metric: Option<String>,
}

/// Owns this plugin instance's Prometheus registry and its counters.
///
/// Counter names and label-name schemas are fixed here at construction;
/// only label values vary per increment. Every distinct label-value
/// combination creates a new time series, which is why callers bound the
/// `packageGroup` domain through grouping rules.
pub struct MetricsSink {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    request_metric: Option<String>,
    package_metric: Option<String>,
}

impl MetricsSink {
    pub fn new(options: SinkOptions) -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        if let Some(name) = &options.request_metric {
            recorder.describe_counter(
                KeyName::from(name.clone()),
                None,
                SharedString::from(HELP_REQUESTS),
            );
        }
        if let Some(name) = &options.package_metric {
            recorder.describe_counter(
                KeyName::from(name.clone()),
                None,
                SharedString::from(HELP_PACKAGE_DOWNLOADS),
            );
        }

        MetricsSink {
            recorder,
            handle,
            request_metric: options.request_metric,
            package_metric: options.package_metric,
        }
    }

    /// Record one request-level sample. No-op when request metrics are
    /// disabled.
    pub fn increment_request(&self, labels: &RequestLabels) {
        let Some(name) = &self.request_metric else {
            return;
        };
        self.increment(
            name,
            vec![
                Label::new("username", labels.username.clone()),
                Label::new("userAgentName", labels.user_agent_name.clone()),
                Label::new("statusCode", labels.status_code.to_string()),
                Label::new("httpMethod", labels.http_method.clone()),
            ],
        );
    }

    /// Record one package-download sample. No-op when package metrics are
    /// disabled.
    pub fn increment_package(&self, labels: &PackageLabels) {
        let Some(name) = &self.package_metric else {
            return;
        };
        let mut label_values = vec![
            Label::new("username", labels.username.clone()),
            Label::new("userAgentName", labels.user_agent_name.clone()),
            Label::new("statusCode", labels.status_code.to_string()),
        ];
        if let Some(group) = &labels.package_group {
            label_values.push(Label::new("packageGroup", group.clone()));
        }
        self.increment(name, label_values);
    }

    fn increment(&self, name: &str, labels: Vec<Label>) {
        let key = Key::from_parts(name.to_string(), labels);
        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));
        self.recorder.register_counter(&key, &metadata).increment(1);
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
