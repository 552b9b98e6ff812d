use axum::http::StatusCode;

use crate::headers::{ClientAgent, Identity};

/// Facts about one observed request, captured at arrival time. The final
/// status code is unknown until the response completes, so label
/// finalization happens in a second phase: [`finalize_request`] /
/// [`finalize_package`] consume the context once completion is observed.
///
/// [`finalize_request`]: RequestMetricContext::finalize_request
/// [`finalize_package`]: RequestMetricContext::finalize_package
#[derive(Clone, Debug)]
pub struct RequestMetricContext {
    pub http_method: String,
    pub decoded_path: String,
    pub identity: Identity,
    pub client: ClientAgent,
    pub package_group: Option<String>,
}

/// Label values for one request-level counter increment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestLabels {
    pub http_method: String,
    pub username: String,
    pub user_agent_name: String,
    pub status_code: u16,
}

/// Label values for one package-download counter increment. `package_group`
/// is attached only when a grouping rule matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageLabels {
    pub username: String,
    pub user_agent_name: String,
    pub status_code: u16,
    pub package_group: Option<String>,
}

impl RequestMetricContext {
    pub fn finalize_request(self, status: StatusCode) -> RequestLabels {
        RequestLabels {
            http_method: self.http_method,
            username: self.identity.username,
            user_agent_name: self.client.name,
            status_code: status.as_u16(),
        }
    }

    pub fn finalize_package(self, status: StatusCode) -> PackageLabels {
        PackageLabels {
            username: self.identity.username,
            user_agent_name: self.client.name,
            status_code: status.as_u16(),
            package_group: self.package_group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{derive_client, derive_identity};

    fn context_for(path: &str, group: Option<&str>) -> RequestMetricContext {
        RequestMetricContext {
            http_method: "GET".to_string(),
            decoded_path: path.to_string(),
            identity: derive_identity(None),
            client: derive_client(Some("npm/7.20.5 node/v14.17.1")),
            package_group: group.map(str::to_string),
        }
    }

    #[test]
    fn request_labels_add_status_after_completion() {
        let labels = context_for("/lodash", None).finalize_request(StatusCode::OK);
        assert_eq!(
            labels,
            RequestLabels {
                http_method: "GET".to_string(),
                username: "UNKNOWN".to_string(),
                user_agent_name: "npm".to_string(),
                status_code: 200,
            }
        );
    }

    #[test]
    fn package_labels_carry_optional_group() {
        let grouped = context_for("/a/-/a-1.0.0.tgz", Some("core"))
            .finalize_package(StatusCode::NOT_FOUND);
        assert_eq!(grouped.package_group.as_deref(), Some("core"));
        assert_eq!(grouped.status_code, 404);

        let ungrouped = context_for("/b/-/b-1.0.0.tgz", None).finalize_package(StatusCode::OK);
        assert_eq!(ungrouped.package_group, None);
    }
}
