//! The route table.
//!
//! Every `(family, operation)` pair the engine uses maps to one HTTP method
//! and path template. `{name}` placeholders are filled from the call
//! parameters; the remaining parameters become the query string for reads
//! and deletes, or the JSON body for writes.

use std::fmt;

use catalyst_core::Record;
use serde_json::Value;

use crate::error::{Result, TransportError};

/// HTTP method of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// DELETE.
    Delete,
}

impl Method {
    /// The method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true if parameters travel in the JSON body.
    #[must_use]
    pub const fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// HTTP method.
    pub method: Method,
    /// Path template with `{placeholders}`.
    pub path: &'static str,
}

/// A route with its placeholders filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    /// HTTP method.
    pub method: Method,
    /// Concrete path.
    pub path: String,
    /// Query string pairs, in parameter order.
    pub query: Vec<(String, String)>,
    /// JSON body, for writes.
    pub body: Option<Value>,
}

const fn route(method: Method, path: &'static str) -> Option<Route> {
    Some(Route { method, path })
}

impl Route {
    /// The route used to obtain an auth token.
    pub const AUTH_TOKEN: Self = Self {
        method: Method::Post,
        path: "/dna/system/api/v1/auth/token",
    };

    /// Look up the route for an operation.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn lookup(family: &str, operation: &str) -> Option<Self> {
        use Method::{Delete, Get, Post, Put};

        match (family, operation) {
            ("platform", "release_summary") => route(Get, "/dna/intent/api/v1/dnac-release"),
            ("task", "get_task_by_id") => route(Get, "/dna/intent/api/v1/task/{task_id}"),

            ("site_design", "get_sites") => route(Get, "/dna/intent/api/v1/sites"),
            ("site_design", "create_area") => route(Post, "/dna/intent/api/v1/areas"),
            ("site_design", "update_area") => route(Put, "/dna/intent/api/v1/areas/{id}"),
            ("site_design", "delete_area") => route(Delete, "/dna/intent/api/v1/areas/{id}"),
            ("site_design", "create_building") => route(Post, "/dna/intent/api/v2/buildings"),
            ("site_design", "update_building") => {
                route(Put, "/dna/intent/api/v2/buildings/{id}")
            }
            ("site_design", "delete_building") => {
                route(Delete, "/dna/intent/api/v2/buildings/{id}")
            }
            ("site_design", "create_floor") => route(Post, "/dna/intent/api/v2/floors"),
            ("site_design", "update_floor") => route(Put, "/dna/intent/api/v2/floors/{id}"),
            ("site_design", "delete_floor") => route(Delete, "/dna/intent/api/v2/floors/{id}"),

            ("site_design", "get_network_profiles") => {
                route(Get, "/dna/intent/api/v1/networkProfilesForSites")
            }
            ("site_design", "get_profile_sites") => route(
                Get,
                "/dna/intent/api/v1/networkProfilesForSites/{profile_id}/siteAssignments",
            ),
            ("site_design", "assign_profile_to_site") => route(
                Post,
                "/dna/intent/api/v1/networkProfilesForSites/{profile_id}/siteAssignments",
            ),
            ("site_design", "unassign_profile_from_site") => route(
                Delete,
                "/dna/intent/api/v1/networkProfilesForSites/{profile_id}/siteAssignments/{site_id}",
            ),
            ("site_design", "delete_network_profile") => {
                route(Delete, "/dna/intent/api/v1/networkProfilesForSites/{id}")
            }
            ("site_design", "create_switch_profile") => route(Post, "/api/v1/siteprofile"),
            ("site_design", "update_switch_profile") => route(Put, "/api/v1/siteprofile/{id}"),

            ("configuration_templates", "get_templates") => {
                route(Get, "/dna/intent/api/v2/template-programmer/template")
            }
            ("configuration_templates", "get_profile_templates") => route(
                Get,
                "/dna/intent/api/v1/networkProfilesForSites/{profile_id}/templates",
            ),
            ("configuration_templates", "attach_profile_to_template") => route(
                Post,
                "/dna/intent/api/v1/networkProfilesForSites/{profile_id}/templates",
            ),
            ("configuration_templates", "detach_profile_from_template") => route(
                Delete,
                "/dna/intent/api/v1/networkProfilesForSites/{profile_id}/templates/{template_id}",
            ),

            ("wireless", "get_ssids") => route(
                Get,
                "/dna/intent/api/v1/sites/{site_id}/wirelessSettings/ssids",
            ),
            ("wireless", "create_ssid") => route(
                Post,
                "/dna/intent/api/v1/sites/{site_id}/wirelessSettings/ssids",
            ),
            ("wireless", "update_ssid") => route(
                Put,
                "/dna/intent/api/v1/sites/{site_id}/wirelessSettings/ssids/{id}",
            ),
            ("wireless", "delete_ssid") => route(
                Delete,
                "/dna/intent/api/v1/sites/{site_id}/wirelessSettings/ssids/{id}",
            ),

            ("devices", "get_health_score_definitions") => {
                route(Get, "/dna/intent/api/v1/healthScoreDefinitions")
            }
            ("devices", "update_health_score_definition") => {
                route(Put, "/dna/intent/api/v1/healthScoreDefinitions/{id}")
            }

            ("issues", "get_issue_definitions") => {
                route(Get, "/dna/intent/api/v1/customIssueDefinitions")
            }
            ("issues", "create_issue_definition") => {
                route(Post, "/dna/intent/api/v1/customIssueDefinitions")
            }
            ("issues", "update_issue_definition") => {
                route(Put, "/dna/intent/api/v1/customIssueDefinitions/{id}")
            }
            ("issues", "delete_issue_definition") => {
                route(Delete, "/dna/intent/api/v1/customIssueDefinitions/{id}")
            }
            ("issues", "get_system_issue_definitions") => {
                route(Get, "/dna/intent/api/v1/systemIssueDefinitions")
            }
            ("issues", "update_system_issue_definition") => {
                route(Put, "/dna/intent/api/v1/systemIssueDefinitions/{id}")
            }

            ("sda", "get_fabric_sites") => route(Get, "/dna/intent/api/v1/sda/fabricSites"),
            ("sda", "add_fabric_site") => route(Post, "/dna/intent/api/v1/sda/fabricSites"),
            ("sda", "update_fabric_site") => route(Put, "/dna/intent/api/v1/sda/fabricSites"),
            ("sda", "delete_fabric_site") => {
                route(Delete, "/dna/intent/api/v1/sda/fabricSites/{id}")
            }
            ("sda", "get_fabric_zones") => route(Get, "/dna/intent/api/v1/sda/fabricZones"),
            ("sda", "add_fabric_zone") => route(Post, "/dna/intent/api/v1/sda/fabricZones"),
            ("sda", "update_fabric_zone") => route(Put, "/dna/intent/api/v1/sda/fabricZones"),
            ("sda", "delete_fabric_zone") => {
                route(Delete, "/dna/intent/api/v1/sda/fabricZones/{id}")
            }
            ("sda", "get_transit_networks") => {
                route(Get, "/dna/intent/api/v1/sda/transitNetworks")
            }
            ("sda", "add_transit_network") => {
                route(Post, "/dna/intent/api/v1/sda/transitNetworks")
            }
            ("sda", "update_transit_network") => {
                route(Put, "/dna/intent/api/v1/sda/transitNetworks")
            }
            ("sda", "delete_transit_network") => {
                route(Delete, "/dna/intent/api/v1/sda/transitNetworks/{id}")
            }

            ("sensors", "get_icap_configs") => route(Get, "/dna/intent/api/v1/icapSettings"),
            ("sensors", "create_icap_preview") => route(
                Post,
                "/dna/intent/api/v1/icapSettings/configurationModels",
            ),
            ("sensors", "deploy_icap_preview") => route(
                Post,
                "/dna/intent/api/v1/icapSettings/configurationModels/{preview_activity_id}/deploy",
            ),
            ("sensors", "discard_icap_preview") => route(
                Delete,
                "/dna/intent/api/v1/icapSettings/configurationModels/{preview_activity_id}",
            ),
            ("sensors", "remove_icap_config") => {
                route(Delete, "/dna/intent/api/v1/icapSettings/{id}")
            }

            ("system_settings", "get_auth_servers") => {
                route(Get, "/dna/intent/api/v1/authentication-policy-servers")
            }
            ("system_settings", "add_auth_server") => {
                route(Post, "/dna/intent/api/v1/authentication-policy-servers")
            }
            ("system_settings", "update_auth_server") => route(
                Put,
                "/dna/intent/api/v1/authentication-policy-servers/{id}",
            ),
            ("system_settings", "delete_auth_server") => route(
                Delete,
                "/dna/intent/api/v1/authentication-policy-servers/{id}",
            ),

            _ => None,
        }
    }

    /// Names of the placeholders in the path template, in order.
    pub fn placeholders(&self) -> impl Iterator<Item = &'static str> {
        self.path
            .split('{')
            .skip(1)
            .filter_map(|rest| rest.split_once('}').map(|(name, _)| name))
    }

    /// Fill placeholders from `params` and distribute the rest.
    ///
    /// A `payload` parameter on a write is sent verbatim as the body; other
    /// leftover parameters on a write are sent as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` if a placeholder has no parameter.
    pub fn resolve(&self, operation: &str, params: &Record) -> Result<ResolvedRequest> {
        let mut rest = params.clone();
        let mut path = self.path.to_string();

        for name in self.placeholders() {
            let value = rest
                .remove(name)
                .filter(|value| !value.is_null())
                .map(|value| scalar_text(&value))
                .ok_or_else(|| TransportError::MissingParameter {
                    operation: operation.to_string(),
                    parameter: name.to_string(),
                })?;
            path = path.replace(&format!("{{{name}}}"), &value);
        }

        let (query, body) = if self.method.has_body() {
            let body = match rest.remove("payload") {
                Some(payload) => Some(payload),
                None if rest.is_empty() => None,
                None => Some(rest.into_value()),
            };
            (Vec::new(), body)
        } else {
            let query = rest
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), scalar_text(value)))
                .collect();
            (query, None)
        };

        Ok(ResolvedRequest {
            method: self.method,
            path,
            query,
            body,
        })
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_known_and_unknown() {
        let route = Route::lookup("wireless", "create_ssid").unwrap();
        assert_eq!(route.method, Method::Post);
        assert!(Route::lookup("wireless", "explode").is_none());
        assert!(Route::lookup("nope", "get_sites").is_none());
    }

    #[test]
    fn placeholders_in_order() {
        let route = Route::lookup("site_design", "unassign_profile_from_site").unwrap();
        let names: Vec<&str> = route.placeholders().collect();
        assert_eq!(names, ["profile_id", "site_id"]);
    }

    #[test]
    fn get_moves_leftovers_to_query() {
        let route = Route::lookup("site_design", "get_sites").unwrap();
        let params = Record::new()
            .with("nameHierarchy", "Global/USA")
            .with("offset", 1)
            .with("limit", 500);
        let resolved = route.resolve("get_sites", &params).unwrap();
        assert_eq!(resolved.path, "/dna/intent/api/v1/sites");
        assert_eq!(
            resolved.query,
            vec![
                ("nameHierarchy".to_string(), "Global/USA".to_string()),
                ("offset".to_string(), "1".to_string()),
                ("limit".to_string(), "500".to_string()),
            ]
        );
        assert!(resolved.body.is_none());
    }

    #[test]
    fn write_sends_payload_verbatim() {
        let route = Route::lookup("wireless", "update_ssid").unwrap();
        let params = Record::new()
            .with("site_id", "S1")
            .with("id", "ssid-1")
            .with("payload", json!({"ssid": "Corp"}));
        let resolved = route.resolve("update_ssid", &params).unwrap();
        assert_eq!(
            resolved.path,
            "/dna/intent/api/v1/sites/S1/wirelessSettings/ssids/ssid-1"
        );
        assert_eq!(resolved.body, Some(json!({"ssid": "Corp"})));
        assert!(resolved.query.is_empty());
    }

    #[test]
    fn write_without_payload_sends_leftovers() {
        let route = Route::lookup("sda", "add_fabric_site").unwrap();
        let params = Record::new().with("siteId", "S1").with("authenticationProfileName", "No Authentication");
        let resolved = route.resolve("add_fabric_site", &params).unwrap();
        assert_eq!(
            resolved.body,
            Some(json!({"siteId": "S1", "authenticationProfileName": "No Authentication"}))
        );
    }

    #[test]
    fn missing_placeholder_is_an_error() {
        let route = Route::lookup("task", "get_task_by_id").unwrap();
        let err = route.resolve("get_task_by_id", &Record::new()).unwrap_err();
        assert!(matches!(
            err,
            TransportError::MissingParameter { ref parameter, .. } if parameter == "task_id"
        ));
    }
}
