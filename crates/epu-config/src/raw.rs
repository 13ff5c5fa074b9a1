use serde::Deserialize;

/// Raw YAML representation of a domain-definition config file
/// (`<name>.definition.yml`).
#[derive(Debug, Deserialize)]
pub struct RawDomainDefinition {
    pub definition_id: String,
    pub engine_class: String,
    #[serde(default)]
    pub engine_conf: serde_json::Value,
    #[serde(default)]
    pub health: RawHealthTimeouts,
    #[serde(default)]
    pub monitor_health: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawHealthTimeouts {
    pub boot_seconds: Option<u64>,
    pub missing_seconds: Option<u64>,
    pub really_missing_seconds: Option<u64>,
    pub zombie_seconds: Option<u64>,
}

impl Default for RawHealthTimeouts {
    fn default() -> Self {
        RawHealthTimeouts {
            boot_seconds: None,
            missing_seconds: None,
            really_missing_seconds: None,
            zombie_seconds: None,
        }
    }
}

/// Raw YAML representation of a domain config file (`<name>.domain.yml`).
#[derive(Debug, Deserialize)]
pub struct RawDomain {
    pub domain_id: String,
    #[serde(default)]
    pub owner: String,
    pub definition_id: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub subscribers: Vec<String>,
}
