//! History Aggregator: contadores diarios por estado.
//!
//! La clave de cada bucket es la fecha local del servidor (`YYYY/MM/DD`) en el
//! momento de la ingesta, no la fecha de ejecución informada por el nodo.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use log::{debug, info};

use crate::errors::StoreError;
use crate::model::{HistoryBucket, HistoryDelta};
use crate::store::ReportStore;

pub const DATE_KEY_FORMAT: &str = "%Y/%m/%d";

pub struct HistoryAggregator {
    store: Arc<dyn ReportStore>,
}

impl HistoryAggregator {
    pub fn new(store: Arc<dyn ReportStore>) -> Self { Self { store } }

    /// Fecha local (`YYYY/MM/DD`) para un epoch en segundos.
    pub fn date_key(epoch: i64) -> String {
        let utc = DateTime::<Utc>::from_timestamp(epoch, 0).unwrap_or_default();
        utc.with_timezone(&Local).format(DATE_KEY_FORMAT).to_string()
    }

    pub fn delta_for(state: &str) -> HistoryDelta { HistoryDelta::for_label(state) }

    /// Suma 1 al contador de `state` en el bucket del día de `epoch`.
    /// El bucket se crea aunque el estado no sea reconocido.
    pub fn increment(&self, epoch: i64, state: &str) -> Result<(), StoreError> {
        let date = Self::date_key(epoch);
        debug!("history:increment date={date} state={state}");
        self.store.increment_history(&date, Self::delta_for(state))
    }

    pub fn all_buckets(&self) -> Result<Vec<HistoryBucket>, StoreError> { self.store.history_buckets() }

    /// Conserva los `retain_days` buckets más recientes.
    pub fn prune(&self, retain_days: usize) -> Result<usize, StoreError> {
        let removed = self.store.prune_history(retain_days)?;
        if removed > 0 {
            info!("history:pruned removed={removed} retain={retain_days}");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryReportStore;

    #[test]
    fn date_key_has_slash_format() {
        let key = HistoryAggregator::date_key(1_709_287_200);
        assert_eq!(key.len(), 10);
        assert_eq!(key.matches('/').count(), 2);
        assert!(key.starts_with("2024/0"));
    }

    #[test]
    fn unknown_state_creates_empty_bucket() {
        let agg = HistoryAggregator::new(Arc::new(InMemoryReportStore::new()));
        agg.increment(1_709_287_200, "noop").unwrap();
        let buckets = agg.all_buckets().unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total(), 0);
    }

    #[test]
    fn prune_is_noop_within_retention() {
        let store = Arc::new(InMemoryReportStore::new());
        let agg = HistoryAggregator::new(store.clone());
        for day in 1..=3 {
            store.increment_history(&format!("2024/01/0{day}"), HistoryDelta::for_label("failed")).unwrap();
        }
        assert_eq!(agg.prune(14).unwrap(), 0);
        assert_eq!(agg.prune(2).unwrap(), 1);
        assert_eq!(agg.all_buckets().unwrap()[0].date, "2024/01/02");
    }
}
