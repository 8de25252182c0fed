//! Avaliação de threshold e eventos de alerta.

use crate::types::Reading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resultado da comparação de uma leitura com o limite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Breach,
    NoBreach,
}

impl Evaluation {
    pub fn is_breach(self) -> bool {
        self == Evaluation::Breach
    }
}

/// Em que momento o threshold é avaliado.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// A cada mensagem, sobre a leitura recém-gravada
    #[default]
    Ingested,
    /// A cada mensagem, sobre `latest()` consultado logo após o insert
    Latest,
    /// Só no ciclo do relatório, sobre `latest()`
    Report,
}

/// Um alerta disparado. Consumido uma única vez pelo notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub reading: Reading,
    pub threshold: f64,
    pub triggered_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(reading: Reading, threshold: f64) -> Self {
        Self {
            reading,
            threshold,
            triggered_at: Utc::now(),
        }
    }
}

/// Compara estritamente: `temperatura > threshold` é breach; igual não é.
pub fn evaluate(reading: &Reading, threshold: f64) -> Evaluation {
    if reading.temperature > threshold {
        Evaluation::Breach
    } else {
        Evaluation::NoBreach
    }
}

/// Avalia e, em caso de breach, já monta o [`AlertEvent`].
pub fn check(reading: &Reading, threshold: f64) -> Option<AlertEvent> {
    evaluate(reading, threshold)
        .is_breach()
        .then(|| AlertEvent::new(reading.clone(), threshold))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
