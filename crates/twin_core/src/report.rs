//! Ciclo de relatório: agregado da janela + checagem da última leitura.
//!
//! Roda fora do caminho de ingestão e só lê o store.

use crate::aggregate::{self, AggregateReport};
use crate::alerts::{self, Evaluation};
use crate::notifier::AlertQueue;
use crate::store::{ReadingStore, StoreError};
use crate::types::Reading;
use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Resultado de um ciclo.
#[derive(Debug)]
pub struct ReportCycle {
    pub report: AggregateReport,
    /// Última leitura e sua avaliação (só quando a janela não está vazia
    /// e o ciclo checa threshold)
    pub latest: Option<(Reading, Evaluation)>,
}

/// Parâmetros do ciclo.
#[derive(Debug, Clone, Copy)]
pub struct ReportSettings {
    pub window: Duration,
    /// `Some(limite)` quando o ciclo avalia `latest()`
    pub threshold: Option<f64>,
}

/// Executa um ciclo no instante `now`.
pub fn run_cycle_at(
    store: &dyn ReadingStore,
    settings: &ReportSettings,
    queue: Option<&AlertQueue>,
    now: DateTime<Utc>,
) -> Result<ReportCycle, StoreError> {
    let report = aggregate::aggregate_at(store, settings.window, now)?;

    let latest = match settings.threshold {
        Some(threshold) if !report.is_empty() => match store.latest()? {
            Some(reading) => {
                let evaluation = alerts::evaluate(&reading, threshold);
                if evaluation.is_breach() {
                    warn!(
                        "⚠️ Temperatura alta: {:.2}°C > {threshold}°C",
                        reading.temperature
                    );
                    if let Some(queue) = queue {
                        let event = alerts::AlertEvent::new(reading.clone(), threshold);
                        if let Err(e) = queue.submit(event) {
                            warn!("Alerta não enfileirado: {e}");
                        }
                    }
                } else {
                    info!("Status normal ({:.2}°C)", reading.temperature);
                }
                Some((reading, evaluation))
            }
            None => None,
        },
        _ => None,
    };

    Ok(ReportCycle { report, latest })
}

/// Executa um ciclo agora.
pub fn run_cycle(
    store: &dyn ReadingStore,
    settings: &ReportSettings,
    queue: Option<&AlertQueue>,
) -> Result<ReportCycle, StoreError> {
    run_cycle_at(store, settings, queue, Utc::now())
}

/// Thread que roda ciclos a cada `interval`.
pub struct ReportScheduler {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ReportScheduler {
    /// Inicia a thread. O primeiro ciclo roda após um `interval`.
    pub fn spawn(
        store: Arc<dyn ReadingStore>,
        settings: ReportSettings,
        queue: Option<AlertQueue>,
        interval: std::time::Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let worker = std::thread::Builder::new()
            .name("report-scheduler".into())
            .spawn(move || {
                info!("Relatório periódico a cada {}s", interval.as_secs());
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            match run_cycle(store.as_ref(), &settings, queue.as_ref()) {
                                Ok(cycle) => info!("\n{}", cycle.report),
                                Err(e) => error!("Falha no ciclo de relatório: {e}"),
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Relatório periódico encerrado");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Para a thread e espera o ciclo corrente terminar.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Thread de relatório terminou com panic");
            }
        }
    }
}

impl Drop for ReportScheduler {
    fn drop(&mut self) {
        self.halt();
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
