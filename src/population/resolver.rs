//! Population resolver — runs the provider cascade over every settlement.
//!
//! Per settlement:  provider 1 → provider 2 → … → not found
//! A provider error counts as "no value" and the cascade moves on.

use super::config::PopulationConfig;
use super::journal::{ErrorLog, FileLog};
use super::providers::{self, PopulationProvider};
use super::types::{SearchStats, Settlement, SettlementError, SettlementStore};
use std::thread;
use std::time::Duration;

/// Fixed pause between settlements to stay within third-party rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    interval: Duration,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// No pausing at all (for testing).
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep for the full interval. Called once per settlement, whatever the outcome.
    pub fn pause(&self) {
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
    }
}

/// The provider cascade with its error journal and pacing.
pub struct PopulationResolver<L: ErrorLog = FileLog> {
    providers: Vec<Box<dyn PopulationProvider>>,
    log: L,
    limiter: RateLimiter,
}

impl PopulationResolver<FileLog> {
    /// Real providers, file journal, and configured delay.
    pub fn from_config(config: &PopulationConfig) -> Self {
        Self::new(
            providers::default_providers(config),
            FileLog::new(config.log_path.clone()),
            RateLimiter::new(config.request_delay()),
        )
    }
}

impl<L: ErrorLog> PopulationResolver<L> {
    /// Providers are tried in the order given.
    pub fn new(providers: Vec<Box<dyn PopulationProvider>>, log: L, limiter: RateLimiter) -> Self {
        Self { providers, log, limiter }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Resolve every settlement in input order and return the outcome counts.
    pub fn resolve_all(&mut self, store: &mut SettlementStore) -> SearchStats {
        let mut stats = SearchStats::new(self.providers.iter().map(|p| p.source().to_string()));
        let count = store.len();

        for (i, settlement) in store.iter_mut().enumerate() {
            // Resolved before this run: no lookup, no pause, not counted.
            if settlement.is_resolved() {
                eprintln!(
                    "Skipped {}/{}: {} - already resolved by {}",
                    i + 1,
                    count,
                    settlement.name,
                    settlement.source().unwrap_or_default()
                );
                continue;
            }

            stats.begin();

            match self.resolve_one(settlement) {
                Ok(Some(index)) => stats.record_found(index),
                Ok(None) => stats.record_not_found(),
                Err(e) => {
                    // Unprocessable record: journal it and count it as not found.
                    let msg = format!("Error processing {}: {}", settlement.name, e);
                    eprintln!("  {}", msg);
                    self.log.record(&msg);
                    stats.record_not_found();
                }
            }

            let outcome = match settlement.population() {
                Some(p) => p.to_string(),
                None => "not found".to_string(),
            };
            eprintln!("Processed {}/{}: {} - {}", i + 1, count, settlement.name, outcome);

            self.limiter.pause();
        }

        stats
    }

    /// Run the cascade for a single settlement.
    ///
    /// Returns the index of the provider that supplied the population, or
    /// `None` when every provider came back empty. Already-resolved records
    /// are left untouched and no provider is called.
    pub fn resolve_one(&self, settlement: &mut Settlement) -> Result<Option<usize>, SettlementError> {
        if settlement.is_resolved() {
            return Ok(None);
        }
        settlement.validate()?;

        for (index, provider) in self.providers.iter().enumerate() {
            match provider.lookup(settlement) {
                Ok(Some(population)) => {
                    if settlement.set_resolution(population, provider.source()) {
                        return Ok(Some(index));
                    }
                    return Ok(None);
                }
                Ok(None) => {}
                Err(e) => {
                    self.log.record(&format!(
                        "{} lookup failed for {}: {}",
                        provider.source(),
                        settlement.name,
                        e
                    ));
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::journal::MemoryLog;
    use super::super::types::ProviderError;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Instant;

    enum Reply {
        Value(u64),
        Empty,
        Fail,
    }

    /// Fake provider with a scripted reply and a shared call counter.
    struct FakeProvider {
        tag: &'static str,
        reply: Box<dyn Fn(&Settlement) -> Reply>,
        calls: Rc<Cell<usize>>,
    }

    impl FakeProvider {
        fn new(tag: &'static str, reply: impl Fn(&Settlement) -> Reply + 'static) -> (Self, Rc<Cell<usize>>) {
            let calls = Rc::new(Cell::new(0));
            let provider = Self { tag, reply: Box::new(reply), calls: calls.clone() };
            (provider, calls)
        }
    }

    impl PopulationProvider for FakeProvider {
        fn source(&self) -> &str {
            self.tag
        }

        fn lookup(&self, settlement: &Settlement) -> Result<Option<u64>, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            match (self.reply)(settlement) {
                Reply::Value(v) => Ok(Some(v)),
                Reply::Empty => Ok(None),
                Reply::Fail => Err(ProviderError::Network("connection reset".into())),
            }
        }
    }

    fn resolver(providers: Vec<FakeProvider>) -> PopulationResolver<MemoryLog> {
        let boxed: Vec<Box<dyn PopulationProvider>> = providers
            .into_iter()
            .map(|p| Box::new(p) as Box<dyn PopulationProvider>)
            .collect();
        PopulationResolver::new(boxed, MemoryLog::new(), RateLimiter::disabled())
    }

    fn tver() -> Settlement {
        Settlement::new("Tver", 56.8587, 35.9176)
    }

    #[test]
    fn test_first_provider_wins() {
        let (p1, c1) = FakeProvider::new("provider-1", |_| Reply::Value(403_726));
        let (p2, c2) = FakeProvider::new("provider-2", |_| Reply::Value(1));
        let (p3, c3) = FakeProvider::new("provider-3", |_| Reply::Value(2));
        let mut r = resolver(vec![p1, p2, p3]);

        let mut store: SettlementStore = vec![tver()].into_iter().collect();
        let stats = r.resolve_all(&mut store);

        let s = store.get(0).unwrap();
        assert_eq!(s.population(), Some(403_726));
        assert_eq!(s.source(), Some("provider-1"));
        assert_eq!(stats.found_by(0), 1);
        assert_eq!(c1.get(), 1);
        assert_eq!(c2.get(), 0);
        assert_eq!(c3.get(), 0);
    }

    #[test]
    fn test_second_provider_tag() {
        let (p1, _) = FakeProvider::new("provider-1", |_| Reply::Empty);
        let (p2, _) = FakeProvider::new("provider-2", |_| Reply::Value(5_234_000));
        let (p3, c3) = FakeProvider::new("provider-3", |_| Reply::Value(2));
        let r = resolver(vec![p1, p2, p3]);

        let mut s = tver();
        assert_eq!(r.resolve_one(&mut s).unwrap(), Some(1));
        assert_eq!(s.source(), Some("provider-2"));
        assert_eq!(s.population(), Some(5_234_000));
        assert_eq!(c3.get(), 0);
    }

    #[test]
    fn test_all_providers_empty() {
        let (p1, c1) = FakeProvider::new("provider-1", |_| Reply::Empty);
        let (p2, c2) = FakeProvider::new("provider-2", |_| Reply::Empty);
        let (p3, c3) = FakeProvider::new("provider-3", |_| Reply::Empty);
        let mut r = resolver(vec![p1, p2, p3]);

        let mut store: SettlementStore =
            vec![Settlement::new("Unknown Hamlet", 60.0, 40.0)].into_iter().collect();
        let stats = r.resolve_all(&mut store);

        let s = store.get(0).unwrap();
        assert_eq!(s.population(), None);
        assert_eq!(s.source(), None);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.found_total(), 0);
        assert_eq!((c1.get(), c2.get(), c3.get()), (1, 1, 1));
        assert!(r.log().is_empty());
    }

    #[test]
    fn test_provider_error_falls_through() {
        let (p1, _) = FakeProvider::new("provider-1", |_| Reply::Fail);
        let (p2, c2) = FakeProvider::new("provider-2", |_| Reply::Value(42));
        let r = resolver(vec![p1, p2]);

        let mut s = tver();
        assert_eq!(r.resolve_one(&mut s).unwrap(), Some(1));
        assert_eq!(s.source(), Some("provider-2"));
        assert_eq!(c2.get(), 1);

        let lines = r.log().lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("provider-1 lookup failed for Tver"));
        assert!(lines[0].contains("connection reset"));
    }

    #[test]
    fn test_every_provider_failing_is_not_found() {
        let (p1, _) = FakeProvider::new("a", |_| Reply::Fail);
        let (p2, _) = FakeProvider::new("b", |_| Reply::Fail);
        let (p3, _) = FakeProvider::new("c", |_| Reply::Fail);
        let mut r = resolver(vec![p1, p2, p3]);

        let mut store: SettlementStore = vec![tver(), tver()].into_iter().collect();
        let stats = r.resolve_all(&mut store);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.not_found, 2);
        assert_eq!(r.log().len(), 6);
    }

    #[test]
    fn test_invalid_settlement_counts_as_not_found() {
        // Records that cannot be processed still land in a bucket so the
        // totals stay balanced.
        let (p1, c1) = FakeProvider::new("provider-1", |_| Reply::Value(7));
        let mut r = resolver(vec![p1]);

        let mut store: SettlementStore = vec![
            Settlement::new("Nowhere", 123.0, 0.0),
            tver(),
        ]
        .into_iter()
        .collect();
        let stats = r.resolve_all(&mut store);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.found_by(0), 1);
        assert!(stats.is_balanced());
        assert_eq!(c1.get(), 1);
        assert!(!store.get(0).unwrap().is_resolved());
        assert!(r.log().lines()[0].starts_with("Error processing Nowhere"));
    }

    #[test]
    fn test_mixed_run_invariants() {
        let (p1, _) = FakeProvider::new("p1", |s| {
            if s.name == "Tver" { Reply::Value(403_726) } else { Reply::Empty }
        });
        let (p2, _) = FakeProvider::new("p2", |s| {
            if s.name == "Klin" { Reply::Fail } else if s.name == "Dmitrov" { Reply::Value(60_000) } else { Reply::Empty }
        });
        let (p3, _) = FakeProvider::new("p3", |s| {
            if s.name == "Klin" { Reply::Value(78_000) } else { Reply::Empty }
        });
        let mut r = resolver(vec![p1, p2, p3]);

        let names = ["Tver", "Dmitrov", "Klin", "Unknown Hamlet", "Tver"];
        let mut store: SettlementStore =
            names.iter().map(|n| Settlement::new(*n, 56.0, 36.0)).collect();
        let stats = r.resolve_all(&mut store);

        assert_eq!(stats.total, 5);
        assert_eq!(stats.found_by(0), 2);
        assert_eq!(stats.found_by(1), 1);
        assert_eq!(stats.found_by(2), 1);
        assert_eq!(stats.not_found, 1);
        assert!(stats.is_balanced());

        for s in store.iter() {
            assert_eq!(s.population().is_some(), s.source().is_some());
        }
        let order: Vec<&str> = store.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(order, names.to_vec());
        assert_eq!(store.get(2).unwrap().source(), Some("p3"));
    }

    #[test]
    fn test_already_resolved_not_overwritten() {
        let (p1, c1) = FakeProvider::new("p1", |_| Reply::Value(1));
        let r = resolver(vec![p1]);

        let mut s = tver();
        s.set_resolution(403_726, "earlier");
        assert_eq!(r.resolve_one(&mut s).unwrap(), None);
        assert_eq!(s.population(), Some(403_726));
        assert_eq!(s.source(), Some("earlier"));
        assert_eq!(c1.get(), 0);
    }

    #[test]
    fn test_already_resolved_skipped_in_stats() {
        let (p1, c1) = FakeProvider::new("p1", |_| Reply::Value(7));
        let mut r = resolver(vec![p1]);

        let mut earlier = tver();
        earlier.set_resolution(403_726, "earlier");
        let mut store: SettlementStore =
            vec![earlier, Settlement::new("Klin", 56.33, 36.73)].into_iter().collect();
        let stats = r.resolve_all(&mut store);

        assert_eq!(c1.get(), 1);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.found_by(0), 1);
        assert_eq!(stats.not_found, 0);
        assert!(stats.is_balanced());
        assert_eq!(store.get(0).unwrap().source(), Some("earlier"));
        assert_eq!(store.get(1).unwrap().population(), Some(7));
    }

    #[test]
    fn test_rate_limiter_pauses_every_settlement() {
        let (p1, _) = FakeProvider::new("p1", |_| Reply::Value(1));
        let boxed: Vec<Box<dyn PopulationProvider>> = vec![Box::new(p1)];
        let mut r = PopulationResolver::new(
            boxed,
            MemoryLog::new(),
            RateLimiter::new(Duration::from_millis(20)),
        );

        let mut store: SettlementStore = vec![tver(), tver(), tver()].into_iter().collect();
        let start = Instant::now();
        r.resolve_all(&mut store);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_rate_limiter_disabled() {
        assert_eq!(RateLimiter::disabled().interval(), Duration::ZERO);
        let start = Instant::now();
        RateLimiter::disabled().pause();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_from_config_uses_configured_delay() {
        let cfg = PopulationConfig { delay_ms: 250, ..PopulationConfig::default() };
        let r = PopulationResolver::from_config(&cfg);
        assert_eq!(r.limiter.interval(), Duration::from_millis(250));
        assert_eq!(r.log().path(), cfg.log_path.as_path());
    }
}
