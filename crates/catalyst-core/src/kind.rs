//! Resource kinds and run states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::version::ControllerVersion;

/// Every controller resource the engine can reconcile.
///
/// The snake-case name is the key used in declarative documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Area, building or floor in the site hierarchy.
    Site,
    /// AAA or ISE authentication and policy server.
    AuthServer,
    /// SD-Access transit network.
    FabricTransit,
    /// SD-Access fabric site.
    FabricSite,
    /// SD-Access fabric zone.
    FabricZone,
    /// Wireless SSID scoped to a site.
    Ssid,
    /// Switching network profile with site and template attachments.
    SwitchProfile,
    /// Device health score KPI threshold.
    HealthScore,
    /// User-defined (custom) issue definition.
    UserIssue,
    /// System issue trigger settings.
    SystemIssue,
    /// Intelligent capture (ICAP) configuration.
    Icap,
}

impl ResourceKind {
    /// All kinds in merge dependency order.
    pub const ALL: [Self; 11] = [
        Self::Site,
        Self::AuthServer,
        Self::FabricTransit,
        Self::FabricSite,
        Self::FabricZone,
        Self::Ssid,
        Self::SwitchProfile,
        Self::HealthScore,
        Self::UserIssue,
        Self::SystemIssue,
        Self::Icap,
    ];

    /// The document key for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::AuthServer => "auth_server",
            Self::FabricTransit => "fabric_transit",
            Self::FabricSite => "fabric_site",
            Self::FabricZone => "fabric_zone",
            Self::Ssid => "ssid",
            Self::SwitchProfile => "switch_profile",
            Self::HealthScore => "health_score",
            Self::UserIssue => "user_issue",
            Self::SystemIssue => "system_issue",
            Self::Icap => "icap",
        }
    }

    /// Position in the merge order. Deletes run in reverse.
    ///
    /// Sites come first because everything else may reference them; profiles
    /// come after the sites and templates they attach to.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Site => 0,
            Self::AuthServer => 1,
            Self::FabricTransit => 2,
            Self::FabricSite => 3,
            Self::FabricZone => 4,
            Self::Ssid => 5,
            Self::SwitchProfile => 6,
            Self::HealthScore => 7,
            Self::UserIssue => 8,
            Self::SystemIssue => 9,
            Self::Icap => 10,
        }
    }

    /// The oldest controller release that supports this resource.
    #[must_use]
    pub const fn min_version(self) -> ControllerVersion {
        match self {
            Self::Site | Self::AuthServer => ControllerVersion::V2_3_5_3,
            Self::FabricTransit | Self::FabricSite | Self::FabricZone | Self::Ssid => {
                ControllerVersion::V2_3_7_6
            }
            Self::SwitchProfile
            | Self::HealthScore
            | Self::UserIssue
            | Self::SystemIssue
            | Self::Icap => ControllerVersion::V2_3_7_9,
        }
    }

    /// The brownfield component that extracts this kind, if any.
    #[must_use]
    pub const fn component(self) -> Option<&'static str> {
        match self {
            Self::Site => Some("site_hierarchy"),
            Self::AuthServer => Some("auth_servers"),
            Self::FabricTransit => Some("fabric_transits"),
            Self::FabricSite => Some("fabric_sites"),
            Self::FabricZone => Some("fabric_zones"),
            Self::Ssid => Some("ssids"),
            Self::SwitchProfile => Some("switch_profiles"),
            Self::HealthScore => Some("health_score_settings"),
            Self::UserIssue => Some("user_defined_issues"),
            Self::SystemIssue => Some("system_issues"),
            Self::Icap => None,
        }
    }

    /// Look up a kind by its brownfield component name.
    #[must_use]
    pub fn from_component(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.component() == Some(name))
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::UnknownResourceKind(s.to_string()))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The target state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Converge every record toward present.
    #[default]
    #[serde(alias = "present")]
    Merged,
    /// Converge every record toward absent.
    #[serde(alias = "absent")]
    Deleted,
    /// Read controller state into a declarative document.
    Gathered,
}

impl FromStr for State {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merged" | "present" => Ok(Self::Merged),
            "deleted" | "absent" => Ok(Self::Deleted),
            "gathered" => Ok(Self::Gathered),
            other => Err(CoreError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Merged => "merged",
            Self::Deleted => "deleted",
            Self::Gathered => "gathered",
        })
    }
}
