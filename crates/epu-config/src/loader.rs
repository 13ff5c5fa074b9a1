use std::path::Path;

use epu_domain::{DefinitionId, Domain, DomainDefinition, DomainId, HealthTimeouts};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawDomain, RawDomainDefinition, RawHealthTimeouts};

/// Load every `*.definition.yml` file directly under `dir` as a
/// `DomainDefinition`. Non-matching files are ignored.
pub fn load_domain_definitions(dir: &Path) -> Result<Vec<DomainDefinition>, ConfigError> {
    let mut definitions = Vec::new();
    for path in yaml_files(dir, ".definition.yml")? {
        let content = read(&path)?;
        let raw: RawDomainDefinition = parse(&content, &path)?;
        debug!(path = %path.display(), "loading domain definition");
        definitions.push(convert_definition(raw, &path)?);
    }
    Ok(definitions)
}

/// Load every `*.domain.yml` file directly under `dir` as a `Domain`.
pub fn load_domains(dir: &Path) -> Result<Vec<Domain>, ConfigError> {
    let mut domains = Vec::new();
    for path in yaml_files(dir, ".domain.yml")? {
        let content = read(&path)?;
        let raw: RawDomain = parse(&content, &path)?;
        debug!(path = %path.display(), "loading domain");
        domains.push(convert_domain(raw, &path)?);
    }
    Ok(domains)
}

fn yaml_files(dir: &Path, suffix: &str) -> Result<Vec<std::path::PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io { path: dir.display().to_string(), source: e })?;
    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::Io { path: dir.display().to_string(), source: e })?;
        let path = entry.path();
        if path.is_file() && path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(suffix)) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io { path: path.display().to_string(), source: e })
}

fn parse<T: serde::de::DeserializeOwned>(content: &str, path: &Path) -> Result<T, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::YamlParse { path: path.display().to_string(), source: e })
}

fn convert_definition(raw: RawDomainDefinition, path: &Path) -> Result<DomainDefinition, ConfigError> {
    let definition_id = DefinitionId::new(raw.definition_id).map_err(|e| conversion(path, e))?;
    Ok(DomainDefinition {
        definition_id,
        engine_class: raw.engine_class,
        engine_conf: raw.engine_conf,
        health: convert_health(raw.health),
        monitor_health: raw.monitor_health,
        revision: 0,
    })
}

fn convert_health(raw: RawHealthTimeouts) -> HealthTimeouts {
    let default = HealthTimeouts::default();
    HealthTimeouts {
        boot_seconds: raw.boot_seconds.unwrap_or(default.boot_seconds),
        missing_seconds: raw.missing_seconds.unwrap_or(default.missing_seconds),
        really_missing_seconds: raw.really_missing_seconds.unwrap_or(default.really_missing_seconds),
        zombie_seconds: raw.zombie_seconds.unwrap_or(default.zombie_seconds),
    }
}

fn convert_domain(raw: RawDomain, path: &Path) -> Result<Domain, ConfigError> {
    let domain_id = DomainId::new(raw.domain_id).map_err(|e| conversion(path, e))?;
    let definition_id = DefinitionId::new(raw.definition_id).map_err(|e| conversion(path, e))?;
    Ok(Domain {
        domain_id,
        owner: raw.owner,
        definition_id,
        config: raw.config,
        subscribers: raw.subscribers,
        revision: 0,
    })
}

fn conversion(path: &Path, e: epu_domain::DomainError) -> ConfigError {
    ConfigError::Conversion { path: path.display().to_string(), message: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixtures() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    #[test]
    fn load_valid_definitions() {
        let defs = load_domain_definitions(&fixtures()).expect("should load without error");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].definition_id.as_str(), "worker-pool");
        assert_eq!(defs[0].engine_class, "fixed-size");
        assert!(!defs[0].monitor_health);
    }

    #[test]
    fn load_valid_domains() {
        let domains = load_domains(&fixtures()).expect("should load without error");
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].domain_id.as_str(), "prod-workers");
        assert_eq!(domains[0].owner, "alice");
    }

    #[test]
    fn missing_dir_returns_error() {
        let dir = Path::new("/nonexistent/path/does/not/exist");
        assert!(load_domain_definitions(dir).is_err());
    }
}
