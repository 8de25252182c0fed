//! Coordenador do pipeline: decode → store → avaliação → alerta.
//!
//! Uma mensagem por vez, até o fim, antes da próxima. Falha em qualquer
//! estágio é logada e isolada naquela mensagem; o loop só termina quando o
//! inbox fecha (a assinatura foi encerrada externamente).

use crate::alerts::{self, AlertEvent, EvaluationMode};
use crate::notifier::{AlertQueue, NotifyError};
use crate::protocol::{DecodeError, Decoder};
use crate::store::{ReadingStore, StoreError};
use crate::types::Reading;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mensagem recebida da assinatura.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Estado da assinatura.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Subscribed,
    Terminated,
}

/// O que aconteceu com uma mensagem.
#[derive(Debug)]
pub enum MessageOutcome {
    /// Payload rejeitado pelo decoder; nada foi gravado
    Rejected(DecodeError),
    /// Decodificado, mas o store falhou; leitura perdida
    StoreFailed(StoreError),
    /// Gravado; `alert` indica se houve breach e o destino do alerta
    Stored {
        reading: Reading,
        alert: AlertOutcome,
    },
}

/// Destino do alerta de uma mensagem gravada.
#[derive(Debug)]
pub enum AlertOutcome {
    /// Sem breach (ou avaliação fica para o relatório)
    None,
    /// Breach enfileirado para envio
    Queued,
    /// Breach detectado, mas o alerta não pôde ser enfileirado
    Dropped(NotifyError),
    /// Consulta de `latest()` falhou no modo `latest`
    EvaluationFailed(StoreError),
}

/// Contadores do pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub rejected: u64,
    pub stored: u64,
    pub store_failures: u64,
    pub breaches: u64,
    pub alerts_queued: u64,
    pub alerts_dropped: u64,
}

/// Coordenador com dependências injetadas.
pub struct Pipeline {
    decoder: Decoder,
    store: Arc<dyn ReadingStore>,
    alerts: AlertQueue,
    threshold: f64,
    mode: EvaluationMode,
    state: CoordinatorState,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        decoder: Decoder,
        store: Arc<dyn ReadingStore>,
        alerts: AlertQueue,
        threshold: f64,
        mode: EvaluationMode,
    ) -> Self {
        Self {
            decoder,
            store,
            alerts,
            threshold,
            mode,
            state: CoordinatorState::Subscribed,
            stats: PipelineStats::default(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Processa mensagens até o inbox fechar.
    pub fn run(&mut self, inbox: &Receiver<InboundMessage>) -> PipelineStats {
        info!(
            "Pipeline ativo (formato {:?}, threshold {}°C, modo {:?})",
            self.decoder.format(),
            self.threshold,
            self.mode
        );
        for msg in inbox.iter() {
            self.handle_message(&msg);
        }
        self.state = CoordinatorState::Terminated;

        let s = self.stats;
        info!(
            "Pipeline encerrado: {} recebidas, {} rejeitadas, {} gravadas, {} falhas de store, \
             {} breaches, {} alertas enfileirados, {} descartados",
            s.received,
            s.rejected,
            s.stored,
            s.store_failures,
            s.breaches,
            s.alerts_queued,
            s.alerts_dropped
        );
        s
    }

    /// Passa uma mensagem por todos os estágios.
    pub fn handle_message(&mut self, msg: &InboundMessage) -> MessageOutcome {
        self.stats.received += 1;

        // ── Decode ──
        let sample = match self.decoder.decode(&msg.payload) {
            Ok(sample) => sample,
            Err(e) => {
                self.stats.rejected += 1;
                warn!("Mensagem descartada de '{}' ({}): {e}", msg.topic, e.reason());
                return MessageOutcome::Rejected(e);
            }
        };
        debug!("📥 {}: {:.2}°C", msg.topic, sample.temperature);

        // ── Store ──
        let reading = match self.store.append(sample) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.store_failures += 1;
                error!("Falha ao gravar leitura: {e}");
                return MessageOutcome::StoreFailed(e);
            }
        };
        self.stats.stored += 1;
        info!(
            "✅ Leitura gravada: {:.2}°C em {}",
            reading.temperature,
            reading.ingested_at.to_rfc3339()
        );

        // ── Avaliação ──
        let alert = match self.mode {
            EvaluationMode::Ingested => self.raise_if_breach(&reading),
            EvaluationMode::Latest => match self.store.latest() {
                Ok(Some(latest)) => self.raise_if_breach(&latest),
                Ok(None) => AlertOutcome::None,
                Err(e) => {
                    error!("Falha ao consultar última leitura: {e}");
                    AlertOutcome::EvaluationFailed(e)
                }
            },
            EvaluationMode::Report => AlertOutcome::None,
        };

        MessageOutcome::Stored { reading, alert }
    }

    fn raise_if_breach(&mut self, reading: &Reading) -> AlertOutcome {
        let Some(event) = alerts::check(reading, self.threshold) else {
            return AlertOutcome::None;
        };
        self.stats.breaches += 1;
        warn!(
            "⚠️ Threshold excedido: {:.2}°C > {}°C",
            reading.temperature, self.threshold
        );
        self.enqueue(event)
    }

    fn enqueue(&mut self, event: AlertEvent) -> AlertOutcome {
        match self.alerts.submit(event) {
            Ok(()) => {
                self.stats.alerts_queued += 1;
                AlertOutcome::Queued
            }
            Err(e) => {
                self.stats.alerts_dropped += 1;
                warn!("Alerta não enfileirado: {e}");
                AlertOutcome::Dropped(e)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
