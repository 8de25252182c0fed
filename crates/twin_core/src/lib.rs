//! # Twin Core
//!
//! Núcleo do Digital Twin: decodifica a telemetria publicada pelos
//! dispositivos, grava cada leitura, calcula estatísticas da janela móvel e
//! dispara alertas quando o threshold é excedido.
//!
//! ## Módulos
//! - [`types`] – Sample decodificado e Reading persistida
//! - [`protocol`] – Decoder das variantes JSON e escalar
//! - [`store`] – Trait do store + store em memória
//! - [`postgres_store`] – Store PostgreSQL com pool r2d2
//! - [`aggregate`] – count/média/máx/mín da janela
//! - [`alerts`] – Avaliação de threshold
//! - [`notifier`] – E-mail/log e thread de envio
//! - [`pipeline`] – Coordenador por mensagem
//! - [`report`] – Ciclo de relatório periódico
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod protocol;
pub mod store;
pub mod postgres_store;
pub mod aggregate;
pub mod alerts;
pub mod notifier;
pub mod pipeline;
pub mod report;
pub mod config;

// Re-exports convenientes
pub use types::{Reading, Sample};
pub use protocol::{Decoder, PayloadFormat};
pub use store::{MemoryStore, ReadingStore, StoreError};
pub use pipeline::{InboundMessage, Pipeline};
pub use config::AppConfig;
