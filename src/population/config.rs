//! Run configuration: endpoints, HTTP client settings, and query scope.
//!
//! Defaults target Russian settlements on the public Wikidata and Overpass
//! endpoints. A JSON file may override any subset of fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub sparql_endpoint: String,
    pub overpass_endpoint: String,
    pub user_agent: String,
    /// Per-request timeout; a timed-out call counts as "no value".
    pub timeout_secs: u64,
    /// Pause after every settlement.
    pub delay_ms: u64,
    /// Wikidata country item (P17) the search is restricted to.
    pub country_qid: String,
    pub label_language: String,
    /// Wikidata class (P31) for the label search.
    pub settlement_class_qid: String,
    pub radius_km: f64,
    /// OSM `name` of the administrative area the Overpass search is scoped to.
    pub area_name: String,
    pub admin_level: u8,
    pub log_path: PathBuf,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            sparql_endpoint: "https://query.wikidata.org/sparql".into(),
            overpass_endpoint: "https://overpass-api.de/api/interpreter".into(),
            user_agent: "CityPopulationBot/1.0".into(),
            timeout_secs: 30,
            delay_ms: 2000,
            country_qid: "Q159".into(),
            label_language: "ru".into(),
            settlement_class_qid: "Q16110".into(),
            radius_km: 5.0,
            area_name: "Россия".into(),
            admin_level: 2,
            log_path: PathBuf::from("population_search.log"),
        }
    }
}

impl PopulationConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&data)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    /// Build the HTTP agent shared by every provider.
    pub fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(&self.user_agent)
            .build()
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read(String),
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(msg) => write!(f, "Cannot read config: {}", msg),
            Self::Parse(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
