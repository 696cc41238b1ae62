//! Core types for the population subsystem.

use serde::Serialize;
use std::fmt;

/// Population plus the provider that supplied it. Kept together so a
/// settlement can never carry one without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resolution {
    population: u64,
    source: String,
}

/// One named place to enrich with a population figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    resolution: Option<Resolution>,
}

impl Settlement {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into().trim().to_string(),
            lat,
            lon,
            resolution: None,
        }
    }

    /// Check the record is fit to be sent to a provider.
    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.name.is_empty() {
            return Err(SettlementError::EmptyName);
        }
        if !self.lat.is_finite()
            || !self.lon.is_finite()
            || !(-90.0..=90.0).contains(&self.lat)
            || !(-180.0..=180.0).contains(&self.lon)
        {
            return Err(SettlementError::InvalidCoordinates {
                name: self.name.clone(),
                lat: self.lat,
                lon: self.lon,
            });
        }
        Ok(())
    }

    pub fn population(&self) -> Option<u64> {
        self.resolution.as_ref().map(|r| r.population)
    }

    pub fn source(&self) -> Option<&str> {
        self.resolution.as_ref().map(|r| r.source.as_str())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Record the resolved population. Set-once: returns false and leaves the
    /// record untouched if it was already resolved.
    pub fn set_resolution(&mut self, population: u64, source: impl Into<String>) -> bool {
        if self.resolution.is_some() {
            return false;
        }
        self.resolution = Some(Resolution {
            population,
            source: source.into(),
        });
        true
    }
}

/// Ordered collection of settlements for one run. Input order is output order.
#[derive(Debug, Clone, Default)]
pub struct SettlementStore {
    settlements: Vec<Settlement>,
}

impl SettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, settlement: Settlement) {
        self.settlements.push(settlement);
    }

    pub fn len(&self) -> usize {
        self.settlements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settlements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Settlement> {
        self.settlements.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Settlement> {
        self.settlements.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Settlement> {
        self.settlements.iter_mut()
    }
}

impl FromIterator<Settlement> for SettlementStore {
    fn from_iter<I: IntoIterator<Item = Settlement>>(iter: I) -> Self {
        Self {
            settlements: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SettlementStore {
    type Item = &'a Settlement;
    type IntoIter = std::slice::Iter<'a, Settlement>;

    fn into_iter(self) -> Self::IntoIter {
        self.settlements.iter()
    }
}

/// How many settlements one provider resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: usize,
}

/// Aggregate outcome counts for a run.
///
/// Every settlement lands in exactly one bucket: one of the per-provider
/// counts or `not_found`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub total: usize,
    pub found: Vec<SourceCount>,
    pub not_found: usize,
}

impl SearchStats {
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            total: 0,
            found: sources
                .into_iter()
                .map(|s| SourceCount { source: s.into(), count: 0 })
                .collect(),
            not_found: 0,
        }
    }

    /// A settlement has started processing.
    pub fn begin(&mut self) {
        self.total += 1;
    }

    /// An index with no matching provider bucket is counted as not found,
    /// so the totals stay balanced.
    pub fn record_found(&mut self, provider_index: usize) {
        match self.found.get_mut(provider_index) {
            Some(bucket) => bucket.count += 1,
            None => self.not_found += 1,
        }
    }

    pub fn record_not_found(&mut self) {
        self.not_found += 1;
    }

    pub fn found_by(&self, provider_index: usize) -> usize {
        self.found.get(provider_index).map(|b| b.count).unwrap_or(0)
    }

    pub fn found_total(&self) -> usize {
        self.found.iter().map(|b| b.count).sum()
    }

    /// `total == sum(found) + not_found`.
    pub fn is_balanced(&self) -> bool {
        self.total == self.found_total() + self.not_found
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("Search statistics:\n");
        out.push_str(&format!("  Total settlements: {}\n", self.total));
        for bucket in &self.found {
            out.push_str(&format!("  Found via {}: {}\n", bucket.source, bucket.count));
        }
        out.push_str(&format!("  Not found: {}\n", self.not_found));
        out
    }
}

/// A provider failed to answer. Always downgraded to "no value" by the cascade.
#[derive(Debug)]
pub enum ProviderError {
    Network(String),
    Status(u16),
    InvalidResponse(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Status(code) => write!(f, "HTTP status {}", code),
            Self::InvalidResponse(msg) => write!(f, "Invalid API response: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ureq::Error> for ProviderError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, _) => Self::Status(code),
            other => Self::Network(other.to_string()),
        }
    }
}

/// A settlement record that cannot be processed at all.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementError {
    EmptyName,
    InvalidCoordinates { name: String, lat: f64, lon: f64 },
}

impl fmt::Display for SettlementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Settlement has an empty name"),
            Self::InvalidCoordinates { name, lat, lon } => {
                write!(f, "Invalid coordinates for '{}': lat {}, lon {}", name, lat, lon)
            }
        }
    }
}

impl std::error::Error for SettlementError {}
