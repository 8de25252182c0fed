//! Envio de alertas fora do caminho de ingestão.
//!
//! O pipeline só enfileira ([`AlertQueue::submit`], nunca bloqueia); uma
//! thread dedicada ([`AlertDispatcher`]) faz uma única tentativa de envio
//! por alerta. Falha de envio nunca desfaz a leitura já gravada.

use crate::alerts::AlertEvent;
use crate::config::EmailConfig;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Erros de notificação.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Endereço de e-mail inválido: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Erro ao montar mensagem: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Erro SMTP: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Fila de alertas cheia, alerta descartado")]
    QueueFull,

    #[error("Worker de alertas encerrado")]
    WorkerStopped,

    #[error("Falha no envio: {0}")]
    Other(String),
}

/// Canal externo de alertas.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;
}

// ──────────────────────────────────────────────
// Mensagem
// ──────────────────────────────────────────────

/// Texto legível de um alerta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

/// Monta assunto e corpo com a temperatura e o limite configurado.
pub fn render_alert(event: &AlertEvent) -> AlertMessage {
    let temp = event.reading.temperature;
    let limit = event.threshold;
    AlertMessage {
        subject: format!("ALERTA CRÍTICO IoT: {temp}°C"),
        body: format!(
            "ALERTA: o Digital Twin detectou {temp}°C, acima do limite de {limit}°C.\n\
             Leitura registrada em {} (disparo em {}).",
            event.reading.ingested_at.to_rfc3339(),
            event.triggered_at.to_rfc3339(),
        ),
    }
}

// ──────────────────────────────────────────────
// Implementações
// ──────────────────────────────────────────────

/// Só registra o alerta no log (e-mail desabilitado).
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let msg = render_alert(event);
        warn!("{} | {}", msg.subject, msg.body.replace('\n', " "));
        Ok(())
    }
}

/// E-mail via relay SMTP autenticado com TLS implícito.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config.sender.parse()?;
        let to: Mailbox = config.receiver.parse()?;
        let credentials = Credentials::new(config.sender.clone(), config.password.clone());
        let transport = SmtpTransport::relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        info!(
            "Notificador SMTP: {}:{} → {}",
            config.smtp_host, config.smtp_port, config.receiver
        );
        Ok(Self { transport, from, to })
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let msg = render_alert(event);
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(msg.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(msg.body)?;
        self.transport.send(&email)?;
        Ok(())
    }
}

/// Escolhe o notificador pela configuração.
pub fn notifier_from_config(config: &EmailConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    if config.enabled {
        Ok(Arc::new(SmtpNotifier::new(config)?))
    } else {
        info!("E-mail desabilitado, alertas apenas no log");
        Ok(Arc::new(LogNotifier))
    }
}

// ──────────────────────────────────────────────
// Dispatcher
// ──────────────────────────────────────────────

/// Ponta de envio da fila de alertas. Clonável.
#[derive(Debug, Clone)]
pub struct AlertQueue {
    tx: Sender<AlertEvent>,
}

impl AlertQueue {
    #[cfg(test)]
    pub(crate) fn from_sender(tx: Sender<AlertEvent>) -> Self {
        Self { tx }
    }

    /// Enfileira sem bloquear. Fila cheia descarta o alerta.
    pub fn submit(&self, event: AlertEvent) -> Result<(), NotifyError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => NotifyError::QueueFull,
            TrySendError::Disconnected(_) => NotifyError::WorkerStopped,
        })
    }
}

/// Thread de envio de alertas.
pub struct AlertDispatcher {
    queue: AlertQueue,
    worker: Option<JoinHandle<()>>,
}

impl AlertDispatcher {
    /// Inicia a thread de envio com uma fila de `capacity` alertas.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<AlertEvent>(capacity);
        let worker = std::thread::Builder::new()
            .name("alert-dispatcher".into())
            .spawn(move || dispatch_loop(&rx, notifier.as_ref()))?;

        Ok(Self {
            queue: AlertQueue { tx },
            worker: Some(worker),
        })
    }

    pub fn queue(&self) -> AlertQueue {
        self.queue.clone()
    }

    /// Espera a fila esvaziar e encerra a thread.
    ///
    /// A thread só termina quando todas as [`AlertQueue`] clonadas forem
    /// descartadas.
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            // Solta a nossa ponta para o worker ver o canal fechar
            let (closed, _) = bounded(0);
            self.queue = AlertQueue { tx: closed };
            if worker.join().is_err() {
                error!("Thread de alertas terminou com panic");
            }
        }
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.join();
    }
}

fn dispatch_loop(rx: &Receiver<AlertEvent>, notifier: &dyn Notifier) {
    debug!("Thread de alertas iniciada");
    for event in rx.iter() {
        let temp = event.reading.temperature;
        match notifier.notify(&event) {
            Ok(()) => info!("📧 Alerta enviado ({temp}°C > {}°C)", event.threshold),
            Err(e) => error!("Falha ao enviar alerta ({temp}°C): {e}"),
        }
    }
    debug!("Thread de alertas encerrada");
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reading, Sample};
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<f64>>,
    }

    impl Notifier for Recording {
        fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(event.reading.temperature);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Failing {
        attempts: AtomicUsize,
    }

    impl Notifier for Failing {
        fn notify(&self, _event: &AlertEvent) -> Result<(), NotifyError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(NotifyError::Other("relay fora do ar".into()))
        }
    }

    fn event(temp: f64) -> AlertEvent {
        let reading = Reading::from_sample(Sample::scalar(temp), Utc::now());
        AlertEvent::new(reading, 30.0)
    }

    #[test]
    fn message_names_temperature_and_limit() {
        let msg = render_alert(&event(35.5));
        assert!(msg.subject.contains("35.5°C"));
        assert!(msg.body.contains("35.5°C"));
        assert!(msg.body.contains("30°C"));
    }

    #[test]
    fn dispatcher_delivers_each_alert_once() {
        let notifier = Arc::new(Recording::default());
        let dispatcher = AlertDispatcher::spawn(notifier.clone(), 8).unwrap();
        let queue = dispatcher.queue();
        queue.submit(event(31.0)).unwrap();
        queue.submit(event(32.0)).unwrap();
        drop(queue);
        dispatcher.shutdown();

        assert_eq!(*notifier.sent.lock().unwrap(), vec![31.0, 32.0]);
    }

    #[test]
    fn failed_dispatch_is_not_retried() {
        let notifier = Arc::new(Failing::default());
        let dispatcher = AlertDispatcher::spawn(notifier.clone(), 4).unwrap();
        dispatcher.queue().submit(event(40.0)).unwrap();
        dispatcher.shutdown();

        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_queue_drops_alert() {
        let (tx, _rx) = bounded(1);
        let queue = AlertQueue { tx };
        queue.submit(event(31.0)).unwrap();
        assert!(matches!(queue.submit(event(32.0)), Err(NotifyError::QueueFull)));
    }

    #[test]
    fn stopped_worker_is_reported() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let queue = AlertQueue { tx };
        assert!(matches!(queue.submit(event(31.0)), Err(NotifyError::WorkerStopped)));
    }

    #[test]
    fn invalid_address_is_rejected() {
        let config = EmailConfig {
            enabled: true,
            sender: "not-an-address".into(),
            receiver: "ops@example.com".into(),
            ..Default::default()
        };
        assert!(matches!(
            SmtpNotifier::new(&config),
            Err(NotifyError::Address(_))
        ));
    }
}
