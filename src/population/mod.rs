//! Population enrichment subsystem.
//!
//! Runs each settlement through an ordered cascade of open-data providers,
//! recording which provider answered, and tallies the outcomes.

pub mod config;
pub mod journal;
pub mod providers;
pub mod resolver;
pub mod types;

pub use config::{ConfigError, PopulationConfig};
pub use journal::{ErrorLog, FileLog, MemoryLog};
pub use providers::{default_providers, PopulationProvider};
pub use resolver::{PopulationResolver, RateLimiter};
pub use types::{ProviderError, SearchStats, Settlement, SettlementError, SettlementStore, SourceCount};
