//! Persistência de leituras.
//!
//! O [`ReadingStore`] é o único dono dos dados persistidos: o pipeline só
//! faz `append`, o agregador e o avaliador só leem. Escritas são
//! append-only, então leituras concorrentes não precisam de lock na
//! aplicação.

use crate::types::{Reading, Sample};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};

/// Erros do store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Pool de conexões: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Erro do PostgreSQL: {0}")]
    Query(#[from] postgres::Error),

    #[error("Identificador SQL inválido: '{0}'")]
    InvalidIdentifier(String),

    #[error("Valor fora da faixa suportada: {0}")]
    OutOfRange(String),

    #[error("Store indisponível: {0}")]
    Unavailable(String),
}

/// Capacidade de gravar e recuperar leituras ordenadas por tempo.
pub trait ReadingStore: Send + Sync {
    /// Persiste um sample atomicamente e devolve a leitura com o
    /// `ingested_at` atribuído no commit.
    fn append(&self, sample: Sample) -> Result<Reading, StoreError>;

    /// Leitura com o maior `ingested_at`, se houver alguma.
    fn latest(&self) -> Result<Option<Reading>, StoreError>;

    /// Todas as leituras com `ingested_at >= since`, mais recente primeiro.
    fn range(&self, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError>;

    /// As últimas `limit` leituras, mais recente primeiro.
    fn recent(&self, limit: usize) -> Result<Vec<Reading>, StoreError>;
}

// ──────────────────────────────────────────────
// Store em memória
// ──────────────────────────────────────────────

/// Store em memória com o mesmo contrato do store PostgreSQL.
///
/// `ingested_at` é `max(agora, anterior)`, então nunca regride mesmo se o
/// relógio do sistema voltar.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Reading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Número de leituras gravadas.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grava com um instante explícito (ainda respeitando a monotonicidade).
    pub fn append_at(&self, sample: Sample, now: DateTime<Utc>) -> Reading {
        let mut rows = self.lock();
        let ingested_at = match rows.last() {
            Some(prev) if prev.ingested_at > now => prev.ingested_at,
            _ => now,
        };
        let reading = Reading::from_sample(sample, ingested_at);
        rows.push(reading.clone());
        reading
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Reading>> {
        // Um append nunca deixa o vetor pela metade; o poison pode ser ignorado.
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReadingStore for MemoryStore {
    fn append(&self, sample: Sample) -> Result<Reading, StoreError> {
        Ok(self.append_at(sample, Utc::now()))
    }

    fn latest(&self) -> Result<Option<Reading>, StoreError> {
        Ok(self.lock().last().cloned())
    }

    fn range(&self, since: DateTime<Utc>) -> Result<Vec<Reading>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .rev()
            .filter(|r| r.ingested_at >= since)
            .cloned()
            .collect())
    }

    fn recent(&self, limit: usize) -> Result<Vec<Reading>, StoreError> {
        Ok(self.lock().iter().rev().take(limit).cloned().collect())
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn latest_is_last_successful_append() {
        let store = MemoryStore::new();
        assert!(store.latest().unwrap().is_none());

        store.append(Sample::scalar(20.0)).unwrap();
        store.append(Sample::scalar(35.0)).unwrap();
        let last = store.append(Sample::scalar(28.0)).unwrap();

        assert_eq!(store.latest().unwrap(), Some(last));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn ingested_at_never_goes_backwards() {
        let store = MemoryStore::new();
        let first = store.append_at(Sample::scalar(20.0), t0());
        let second = store.append_at(Sample::scalar(21.0), t0() - Duration::minutes(5));
        assert_eq!(second.ingested_at, first.ingested_at);
        assert_eq!(store.latest().unwrap().unwrap().temperature, 21.0);
    }

    #[test]
    fn range_is_inclusive_and_newest_first() {
        let store = MemoryStore::new();
        for (i, temp) in [10.0, 11.0, 12.0, 13.0].into_iter().enumerate() {
            store.append_at(Sample::scalar(temp), t0() + Duration::minutes(i as i64));
        }

        let since = t0() + Duration::minutes(1);
        let temps: Vec<f64> = store
            .range(since)
            .unwrap()
            .iter()
            .map(|r| r.temperature)
            .collect();
        assert_eq!(temps, vec![13.0, 12.0, 11.0]);

        let all = store.range(t0() - Duration::hours(1)).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].ingested_at >= w[1].ingested_at));

        assert!(store.range(t0() + Duration::hours(1)).unwrap().is_empty());
    }

    #[test]
    fn recent_limits_and_orders() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.append_at(Sample::scalar(i as f64), t0() + Duration::seconds(i));
        }
        let temps: Vec<f64> = store.recent(2).unwrap().iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![4.0, 3.0]);
        assert_eq!(store.recent(50).unwrap().len(), 5);
        assert!(store.recent(0).unwrap().is_empty());
    }
}
