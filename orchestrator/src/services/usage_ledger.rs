//! Cost ledger keyed by (provider, UTC hour)

use serde::{Deserialize, Serialize};
use shared::{ProviderId, UsageRecord};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Accumulated usage for one provider in one period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub calls: u64,
    pub cost_units: f64,
    pub cost: f64,
}

/// Per-provider, per-period usage totals; written only by the provider registry
#[derive(Debug, Default)]
pub struct UsageLedger {
    entries: Mutex<BTreeMap<(ProviderId, String), LedgerEntry>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(ProviderId, String), LedgerEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn record(&self, record: &UsageRecord) {
        let mut entries = self.lock();
        let entry = entries
            .entry((record.provider.clone(), record.hour_bucket.clone()))
            .or_default();
        entry.calls += 1;
        entry.cost_units += record.cost_units;
        entry.cost += record.cost;
    }

    /// All periods, ordered by provider then period
    pub fn entries(&self) -> Vec<(ProviderId, String, LedgerEntry)> {
        self.lock()
            .iter()
            .map(|((provider, period), entry)| (provider.clone(), period.clone(), entry.clone()))
            .collect()
    }

    /// Totals for one provider across all periods
    pub fn total_for(&self, provider: &ProviderId) -> LedgerEntry {
        self.lock()
            .iter()
            .filter(|((id, _), _)| id == provider)
            .fold(LedgerEntry::default(), |mut acc, (_, entry)| {
                acc.calls += entry.calls;
                acc.cost_units += entry.cost_units;
                acc.cost += entry.cost;
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::Capability;

    #[test]
    fn test_records_bucket_by_provider_and_hour() {
        let ledger = UsageLedger::new();
        let deepl = ProviderId::from("deepl");
        let nine = Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 0).unwrap();
        let nine_thirty = Utc.with_ymd_and_hms(2024, 5, 1, 9, 35, 0).unwrap();
        let ten = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        ledger.record(&UsageRecord::new(deepl.clone(), Capability::Translate, 2.0, 0.5, nine));
        ledger.record(&UsageRecord::new(deepl.clone(), Capability::Translate, 4.0, 0.5, nine_thirty));
        ledger.record(&UsageRecord::new(deepl.clone(), Capability::Translate, 1.0, 0.5, ten));

        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, "2024-05-01T09");
        assert_eq!(entries[0].2.calls, 2);
        assert_eq!(entries[0].2.cost, 3.0);

        let total = ledger.total_for(&deepl);
        assert_eq!(total.calls, 3);
        assert_eq!(total.cost_units, 7.0);
        assert_eq!(ledger.total_for(&ProviderId::from("other")), LedgerEntry::default());
    }
}
