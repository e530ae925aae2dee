use serde::{Deserialize, Serialize};

/// An IP address entry in the bare-metal inventory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ip {
    pub address: String,
    pub network: Option<String>,
    pub project: String,
    #[serde(rename = "type")]
    pub ip_type: IpType,
    #[serde(default)]
    pub tags: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    #[default]
    Ephemeral,
    Static,
}

impl std::fmt::Display for IpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ephemeral => write!(f, "ephemeral"),
            Self::Static => write!(f, "static"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IpFindRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IpAllocateRequest {
    pub network: String,
    pub project: String,
    #[serde(rename = "type")]
    pub ip_type: IpType,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IpUpdateRequest {
    pub address: String,
    pub tags: Vec<String>,
}
