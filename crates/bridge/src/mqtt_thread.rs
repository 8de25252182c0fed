//! Thread MQTT que assina o tópico e repassa as mensagens ao pipeline via
//! channel.
//!
//! A conexão é lazy: acontece no primeiro poll do event loop. A assinatura é
//! refeita a cada ConnAck, então sobrevive a reconexões com sessão limpa.

use crossbeam_channel::{Receiver, Sender, bounded};
use rumqttc::{Client, ConnectReturnCode, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use twin_core::config::BrokerConfig;
use twin_core::pipeline::InboundMessage;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MIN_KEEP_ALIVE_SECS: u64 = 5;
/// Requisições pendentes no client rumqttc
const CLIENT_CAPACITY: usize = 16;

/// Handle da assinatura ativa.
pub struct Subscription {
    client: Client,
    stopping: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Encerra a assinatura ("stop listening"). O inbox fecha em seguida.
    #[allow(dead_code)]
    pub fn stop(mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.disconnect() {
            debug!("Disconnect MQTT: {e}");
        }
        self.join();
    }

    /// Espera a thread terminar (inbox fechado pelo pipeline ou stop).
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Thread MQTT terminou com panic");
            }
        }
    }
}

/// Opções de conexão a partir da configuração.
pub fn mqtt_options(cfg: &BrokerConfig) -> MqttOptions {
    // Broker público: id único por processo evita derrubar outra instância
    let client_id = format!("{}-{}", cfg.client_id, std::process::id());
    let mut opts = MqttOptions::new(client_id, cfg.host.clone(), cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS)));
    opts.set_clean_session(true);
    opts
}

/// Inicia a thread MQTT. Retorna o receiver do channel e o handle.
pub fn spawn_subscriber_thread(
    cfg: &BrokerConfig,
) -> std::io::Result<(Receiver<InboundMessage>, Subscription)> {
    let (tx, rx) = bounded::<InboundMessage>(cfg.inbox_capacity);
    let (client, connection) = Client::new(mqtt_options(cfg), CLIENT_CAPACITY);
    let stopping = Arc::new(AtomicBool::new(false));

    let topic = cfg.topic.clone();
    let thread_client = client.clone();
    let thread_stopping = Arc::clone(&stopping);
    info!("Conectando a {}:{} – tópico '{}'", cfg.host, cfg.port, cfg.topic);

    let worker = std::thread::Builder::new()
        .name("mqtt-subscriber".into())
        .spawn(move || {
            subscriber_loop(&thread_client, connection, &topic, &tx, &thread_stopping);
        })?;

    Ok((
        rx,
        Subscription {
            client,
            stopping,
            worker: Some(worker),
        },
    ))
}

fn subscriber_loop(
    client: &Client,
    mut connection: Connection,
    topic: &str,
    tx: &Sender<InboundMessage>,
    stopping: &AtomicBool,
) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    error!("Broker recusou a conexão: {:?}", ack.code);
                    continue;
                }
                info!("Conectado ao broker");
                // try_*: estamos na própria thread que faz o poll
                if let Err(e) = client.try_subscribe(topic, QoS::AtLeastOnce) {
                    error!("Falha ao assinar '{topic}': {e}");
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                info!("🚀 Assinatura confirmada: '{topic}'");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = InboundMessage::new(publish.topic, publish.payload.to_vec());
                // Bloqueia se o pipeline estiver atrasado: back-pressure, sem descarte
                if tx.send(msg).is_err() {
                    warn!("Pipeline encerrado, parando assinatura");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) if stopping.load(Ordering::SeqCst) => {
                info!("Desconectado do broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                error!("Conexão MQTT perdida: {e}. Tentando novamente em 2s...");
                std::thread::sleep(RECONNECT_DELAY);
            }
        }
    }
    debug!("Thread MQTT encerrada");
}
