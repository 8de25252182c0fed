//! Decodificação dos payloads MQTT publicados pelos dispositivos.
//!
//! Duas variantes de protocolo convivem, e o bridge é configurado para uma
//! delas por tópico (nunca adivinhada por mensagem):
//!
//! ```text
//! scalar: "23.7"                                   (só temperatura, °C)
//! json:   {"temp": 23.7, "hum": 55.0, "uptime": 812}
//! ```
//!
//! No JSON, `temp`/`temperature` é obrigatório; `hum`/`humidity` e `uptime`
//! são opcionais. Um opcional com tipo errado é ignorado, não rejeita a
//! leitura. Decodificar não tem efeito colateral.

use crate::types::Sample;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Nome do campo obrigatório da variante estruturada.
pub const TEMPERATURE_FIELD: &str = "temperature";

/// Variante de payload esperada no tópico assinado.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Registro JSON com campos nomeados
    #[default]
    Json,
    /// Texto com um único número (temperatura)
    Scalar,
}

/// Erros de decodificação.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload malformado: {0}")]
    Malformed(String),

    #[error("Campo obrigatório ausente: {0}")]
    MissingField(&'static str),
}

impl DecodeError {
    /// Motivo estável, usado em logs e contadores.
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::Malformed(_) => "malformed",
            DecodeError::MissingField(_) => "missing-required-field",
        }
    }
}

/// Decoder configurado para uma variante de payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    format: PayloadFormat,
}

impl Decoder {
    pub fn new(format: PayloadFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Converte bytes brutos do transporte em [`Sample`] validado.
    pub fn decode(&self, raw: &[u8]) -> Result<Sample, DecodeError> {
        match self.format {
            PayloadFormat::Json => decode_structured(raw),
            PayloadFormat::Scalar => decode_scalar(raw),
        }
    }
}

/// Variante escalar: texto UTF-8 com um decimal finito.
pub fn decode_scalar(raw: &[u8]) -> Result<Sample, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let text = text.trim();
    let temperature: f64 = text
        .parse()
        .map_err(|_| DecodeError::Malformed(format!("'{text}' não é um número")))?;
    if !temperature.is_finite() {
        return Err(DecodeError::Malformed(format!("temperatura não finita: {text}")));
    }
    Ok(Sample::scalar(temperature))
}

/// Variante estruturada: objeto JSON com `temperature` (ou `temp`).
pub fn decode_structured(raw: &[u8]) -> Result<Sample, DecodeError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let Some(fields) = value.as_object() else {
        return Err(DecodeError::Malformed("esperado um objeto JSON".into()));
    };

    let temperature = match field(fields, TEMPERATURE_FIELD, "temp") {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| DecodeError::Malformed(format!("temperatura não numérica: {v}")))?,
        None => return Err(DecodeError::MissingField(TEMPERATURE_FIELD)),
    };
    let humidity = optional(fields, "humidity", "hum", Value::as_f64);
    let uptime = optional(fields, "uptime", "uptime", Value::as_u64);

    Ok(Sample {
        temperature,
        humidity,
        uptime,
        payload: Some(value),
    })
}

/// Campo pelo nome canônico ou pelo alias; `null` conta como ausente.
fn field<'a>(fields: &'a Map<String, Value>, name: &str, alias: &str) -> Option<&'a Value> {
    fields
        .get(name)
        .or_else(|| fields.get(alias))
        .filter(|v| !v.is_null())
}

fn optional<T>(
    fields: &Map<String, Value>,
    name: &str,
    alias: &str,
    convert: fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = field(fields, name, alias)?;
    let converted = convert(value);
    if converted.is_none() {
        debug!("Campo opcional '{name}' ignorado: {value}");
    }
    converted
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
