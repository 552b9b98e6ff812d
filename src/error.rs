/// Startup-time configuration failures. Nothing in this crate fails at
/// request time; malformed request input degrades to sentinel label values
/// instead of surfacing an error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("invalid metrics pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("request and package metrics cannot share the counter name '{0}'")]
    DuplicateMetricName(String),

    #[error("metrics path '{0}' must begin with '/'")]
    InvalidMetricsPath(String),
}
