use serde::{Deserialize, Serialize};
use std::fmt;

/// Named service categories resolved independently via discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCapability {
    Mail,
    Calendar,
    Contacts,
    MyFiles,
}

impl ServiceCapability {
    pub const ALL: [ServiceCapability; 4] = [
        ServiceCapability::Mail,
        ServiceCapability::Calendar,
        ServiceCapability::Contacts,
        ServiceCapability::MyFiles,
    ];

    /// Discovery key for this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCapability::Mail => "Mail",
            ServiceCapability::Calendar => "Calendar",
            ServiceCapability::Contacts => "Contacts",
            ServiceCapability::MyFiles => "MyFiles",
        }
    }
}

impl fmt::Display for ServiceCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discovery metadata for one capability. Never partially updated,
/// always replaced as part of a full record rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    pub service_resource_id: String,
    pub service_endpoint_uri: String,
    pub service_api_version: String,
}

impl CapabilityInfo {
    pub fn new(
        service_resource_id: impl Into<String>,
        service_endpoint_uri: impl Into<String>,
        service_api_version: impl Into<String>,
    ) -> Self {
        Self {
            service_resource_id: service_resource_id.into(),
            service_endpoint_uri: service_endpoint_uri.into(),
            service_api_version: service_api_version.into(),
        }
    }
}
