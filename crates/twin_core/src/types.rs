//! Tipos de dados da telemetria do Digital Twin.
//!
//! Um [`Sample`] é o que o decoder extrai do payload MQTT; uma [`Reading`] é
//! o mesmo sample depois de persistido, com o timestamp de ingestão atribuído
//! pelo store (nunca pelo dispositivo).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unidade de temperatura usada em todo o sistema.
pub const TEMPERATURE_UNIT: &str = "C";

// ──────────────────────────────────────────────
// Sample (decodificado, ainda não persistido)
// ──────────────────────────────────────────────

/// Observação decodificada de um dispositivo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Temperatura (°C)
    pub temperature: f64,
    /// Umidade relativa (%)
    pub humidity: Option<f64>,
    /// Segundos desde o boot do dispositivo
    pub uptime: Option<u64>,
    /// Registro JSON original (apenas na variante estruturada)
    pub payload: Option<serde_json::Value>,
}

impl Sample {
    /// Sample da variante escalar: só temperatura.
    pub fn scalar(temperature: f64) -> Self {
        Self {
            temperature,
            ..Default::default()
        }
    }
}

// ──────────────────────────────────────────────
// Reading (persistida)
// ──────────────────────────────────────────────

/// Leitura persistida. Imutável depois de criada pelo store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub uptime: Option<u64>,
    pub payload: Option<serde_json::Value>,
    /// Hora do servidor no commit
    pub ingested_at: DateTime<Utc>,
}

impl Reading {
    /// Materializa a leitura a partir de um sample e do instante de commit.
    pub fn from_sample(sample: Sample, ingested_at: DateTime<Utc>) -> Self {
        Self {
            temperature: sample.temperature,
            humidity: sample.humidity,
            uptime: sample.uptime,
            payload: sample.payload,
            ingested_at,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn scalar_sample_has_no_optional_fields() {
        let s = Sample::scalar(21.5);
        assert_eq!(s.temperature, 21.5);
        assert!(s.humidity.is_none());
        assert!(s.uptime.is_none());
        assert!(s.payload.is_none());
    }

    #[test]
    fn reading_keeps_sample_fields() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let sample = Sample {
            temperature: 28.4,
            humidity: Some(61.0),
            uptime: Some(3600),
            payload: Some(serde_json::json!({ "temp": 28.4, "hum": 61.0, "uptime": 3600 })),
        };
        let reading = Reading::from_sample(sample.clone(), at);
        assert_eq!(reading.temperature, sample.temperature);
        assert_eq!(reading.humidity, sample.humidity);
        assert_eq!(reading.uptime, sample.uptime);
        assert_eq!(reading.payload, sample.payload);
        assert_eq!(reading.ingested_at, at);
    }
}
