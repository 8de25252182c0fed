//! Estatísticas de temperatura numa janela móvel.

use crate::store::{ReadingStore, StoreError};
use crate::types::Reading;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

/// Casas decimais da média no relatório.
pub const AVERAGE_DECIMALS: u32 = 2;

/// Extremos e média de uma janela não vazia.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureStats {
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

/// Relatório agregado. Derivado, nunca persistido.
///
/// `stats` é `None` quando a janela está vazia (`count == 0`).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub count: usize,
    pub stats: Option<TemperatureStats>,
}

impl AggregateReport {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Duração da janela em horas (para o cabeçalho do relatório).
    pub fn window_hours(&self) -> f64 {
        (self.window_end - self.window_start).num_seconds() as f64 / 3600.0
    }
}

/// Arredonda para [`AVERAGE_DECIMALS`] casas, metade para longe do zero.
///
/// O arredondamento é feito sobre o decimal mais curto que representa
/// `value`, então `1.005` vira `1.01` mesmo sendo `1.00499…` em binário.
pub fn round_average(value: f64) -> f64 {
    Decimal::from_f64(value)
        .and_then(|d| round_decimal(d).to_f64())
        .unwrap_or_else(|| round_binary(value))
}

fn round_decimal(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AVERAGE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

fn round_binary(value: f64) -> f64 {
    let factor = 10f64.powi(AVERAGE_DECIMALS as i32);
    (value * factor).round() / factor
}

/// Média exata das temperaturas (soma e divisão em decimal), já arredondada.
fn decimal_mean(readings: &[Reading]) -> Option<f64> {
    let sum = readings.iter().try_fold(Decimal::ZERO, |acc, r| {
        acc.checked_add(Decimal::from_f64(r.temperature)?)
    })?;
    let mean = sum.checked_div(Decimal::from(readings.len()))?;
    round_decimal(mean).to_f64()
}

/// Calcula count/média/máx/mín sobre um conjunto de leituras.
pub fn summarize(readings: &[Reading]) -> Option<TemperatureStats> {
    if readings.is_empty() {
        return None;
    }
    let mut sum = 0.0;
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    for r in readings {
        sum += r.temperature;
        max = max.max(r.temperature);
        min = min.min(r.temperature);
    }
    let average =
        decimal_mean(readings).unwrap_or_else(|| round_average(sum / readings.len() as f64));
    Some(TemperatureStats {
        average,
        max,
        min,
    })
}

/// Agrega a janela `[now - window, now]` consultando o store.
pub fn aggregate_at(
    store: &dyn ReadingStore,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<AggregateReport, StoreError> {
    let window_start = now - window;
    let readings: Vec<Reading> = store
        .range(window_start)?
        .into_iter()
        .filter(|r| r.ingested_at <= now)
        .collect();

    Ok(AggregateReport {
        window_start,
        window_end: now,
        count: readings.len(),
        stats: summarize(&readings),
    })
}

/// Agrega a janela móvel terminando agora.
pub fn aggregate(store: &dyn ReadingStore, window: Duration) -> Result<AggregateReport, StoreError> {
    aggregate_at(store, window, Utc::now())
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.window_hours();
        match &self.stats {
            Some(stats) => {
                writeln!(f, "─── RELATÓRIO DAS ÚLTIMAS {hours:.0}h ───")?;
                writeln!(f, "  Leituras:  {}", self.count)?;
                writeln!(f, "  Média:     {:.2}°C", stats.average)?;
                writeln!(f, "  Máxima:    {:.2}°C", stats.max)?;
                writeln!(f, "  Mínima:    {:.2}°C", stats.min)?;
                write!(f, "──────────────────────────────────")
            }
            None => write!(f, "Nenhuma leitura nas últimas {hours:.0}h"),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Sample;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 18, 0, 0).unwrap()
    }

    #[test]
    fn empty_window_is_flagged() {
        let store = MemoryStore::new();
        let report = aggregate_at(&store, Duration::hours(24), now()).unwrap();
        assert_eq!(report.count, 0);
        assert!(report.is_empty());
        assert!(report.stats.is_none());
        assert_eq!(report.window_end - report.window_start, Duration::hours(24));
    }

    #[test]
    fn stats_over_window() {
        let store = MemoryStore::new();
        for (mins, temp) in [(30, 20.0), (20, 35.0), (10, 28.0)] {
            store.append_at(Sample::scalar(temp), now() - Duration::minutes(mins));
        }
        let report = aggregate_at(&store, Duration::hours(24), now()).unwrap();
        assert_eq!(report.count, 3);
        let stats = report.stats.unwrap();
        assert_eq!(stats.average, 27.67);
        assert_eq!(stats.max, 35.0);
        assert_eq!(stats.min, 20.0);
    }

    #[test]
    fn readings_outside_window_are_ignored() {
        let store = MemoryStore::new();
        store.append_at(Sample::scalar(90.0), now() - Duration::hours(30));
        store.append_at(Sample::scalar(22.0), now() - Duration::hours(2));
        store.append_at(Sample::scalar(24.0), now() - Duration::hours(1));

        let report = aggregate_at(&store, Duration::hours(24), now()).unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(report.stats.unwrap().max, 24.0);
        assert_eq!(report.stats.unwrap().average, 23.0);
    }

    #[test]
    fn average_rounds_to_two_decimals() {
        assert_eq!(round_average(21.004), 21.0);
        assert_eq!(round_average(21.005_1), 21.01);
        assert_eq!(round_average(-3.336), -3.34);
        assert_eq!(round_average(10.0 / 3.0), 3.33);
    }

    #[test]
    fn decimal_ties_round_away_from_zero() {
        // 1.005 e 2.675 ficam abaixo do meio em binário
        assert_eq!(round_average(1.005), 1.01);
        assert_eq!(round_average(2.675), 2.68);
        assert_eq!(round_average(-0.125), -0.13);
    }

    #[test]
    fn average_is_rounded_from_the_exact_mean() {
        let store = MemoryStore::new();
        store.append_at(Sample::scalar(1.0), now() - Duration::minutes(2));
        store.append_at(Sample::scalar(1.01), now() - Duration::minutes(1));

        let report = aggregate_at(&store, Duration::hours(24), now()).unwrap();
        assert_eq!(report.stats.unwrap().average, 1.01);
    }

    #[test]
    fn report_renders_both_shapes() {
        let store = MemoryStore::new();
        let empty = aggregate_at(&store, Duration::hours(24), now()).unwrap();
        assert!(empty.to_string().contains("Nenhuma leitura"));

        store.append_at(Sample::scalar(25.5), now() - Duration::minutes(1));
        let report = aggregate_at(&store, Duration::hours(24), now()).unwrap();
        let text = report.to_string();
        assert!(text.contains("24h"));
        assert!(text.contains("Leituras:  1"));
        assert!(text.contains("25.50°C"));
    }
}
