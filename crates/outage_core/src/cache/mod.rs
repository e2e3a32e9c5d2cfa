/// Short-lived cache of the resolved active / ongoing outage.
///
/// Provides:
/// - One slot per query kind (`Active`, `Ongoing`)
/// - Validity windows: an entry answers lookups in `[from, until)`, where `until` is the next
///   instant at which any stored outage enters or leaves its warning or ongoing period
/// - Explicit invalidation on every mutation
///
/// Losing an entry only costs a recomputation.
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::Outage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    Active,
    Ongoing,
}

#[derive(Debug, Clone)]
struct CachedOutage {
    outage: Option<Outage>,
    from: i64,
    until: Option<i64>,
}

impl CachedOutage {
    fn covers(&self, time: i64) -> bool {
        time >= self.from && self.until.map_or(true, |until| time < until)
    }
}

#[derive(Debug, Default)]
pub struct ActiveOutageCache {
    entries: Mutex<HashMap<CacheSlot, CachedOutage>>,
}

impl ActiveOutageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(resolved)` on a hit (the resolved value itself may be "no outage").
    pub fn get(&self, slot: CacheSlot, time: i64) -> Option<Option<Outage>> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&slot)
            .filter(|cached| cached.covers(time))
            .map(|cached| cached.outage.clone())
    }

    /// Store a result computed at `from`, valid until the next boundary (`None` = open ended).
    pub fn set(&self, slot: CacheSlot, outage: Option<Outage>, from: i64, until: Option<i64>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(slot, CachedOutage { outage, from, until });
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().map(|e| e.len()).unwrap_or(0);
        CacheStats { entries }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
}
