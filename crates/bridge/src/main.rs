//! # Digital Twin Bridge
//!
//! Assina o tópico MQTT dos dispositivos, grava cada leitura no PostgreSQL
//! e dispara alerta por e-mail quando a temperatura excede o threshold.
//!
//! ## Uso
//! ```bash
//! twin_bridge                          # config.toml ao lado do executável
//! TWIN_CONFIG=/etc/twin.toml twin_bridge
//! ```

mod mqtt_thread;

use std::sync::Arc;
use tracing::{error, info, warn};
use twin_core::alerts::EvaluationMode;
use twin_core::config::AppConfig;
use twin_core::notifier::{AlertDispatcher, notifier_from_config};
use twin_core::pipeline::Pipeline;
use twin_core::postgres_store::PostgresStore;
use twin_core::protocol::Decoder;
use twin_core::report::{ReportScheduler, ReportSettings};
use twin_core::store::ReadingStore;

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir (antes dos overrides: sem segredos no arquivo)
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    config.apply_env_overrides();

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        std::process::exit(1);
    }

    // ── Store ──
    let store = match PostgresStore::connect(&config.database) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Falha ao configurar o PostgreSQL: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = store.ensure_schema() {
        warn!("Não foi possível verificar o schema (seguindo mesmo assim): {e}");
    }
    let store: Arc<dyn ReadingStore> = store;

    // ── Alertas ──
    let notifier = match notifier_from_config(&config.email) {
        Ok(n) => n,
        Err(e) => {
            error!("Configuração de e-mail inválida: {e}");
            std::process::exit(1);
        }
    };
    let dispatcher = match AlertDispatcher::spawn(notifier, config.alerts.queue_capacity) {
        Ok(d) => d,
        Err(e) => {
            error!("Falha ao criar thread de alertas: {e}");
            std::process::exit(1);
        }
    };

    // ── Relatório no mesmo processo (opcional) ──
    let scheduler = if config.report.in_process {
        let settings = ReportSettings {
            window: config.report.window(),
            threshold: (config.alerts.mode == EvaluationMode::Report)
                .then_some(config.alerts.threshold),
        };
        match ReportScheduler::spawn(
            Arc::clone(&store),
            settings,
            Some(dispatcher.queue()),
            config.report.interval(),
        ) {
            Ok(s) => Some(s),
            Err(e) => {
                error!("Falha ao criar thread de relatório: {e}");
                None
            }
        }
    } else {
        None
    };

    // ── Assinatura MQTT ──
    let (inbox, mut subscription) = match mqtt_thread::spawn_subscriber_thread(&config.broker) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Falha ao criar thread MQTT: {e}");
            std::process::exit(1);
        }
    };

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🚀 DIGITAL TWIN BRIDGE – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Broker:    {}:{}", config.broker.host, config.broker.port);
    println!("  Tópico:    {}", config.broker.topic);
    println!("  Payload:   {:?}", config.broker.payload_format);
    println!("  Threshold: {}°C ({:?})", config.alerts.threshold, config.alerts.mode);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let mut pipeline = Pipeline::new(
        Decoder::new(config.broker.payload_format),
        store,
        dispatcher.queue(),
        config.alerts.threshold,
        config.alerts.mode,
    );
    pipeline.run(&inbox);

    // Inbox fechou: assinatura encerrada
    subscription.join();
    if let Some(s) = scheduler {
        s.stop();
    }
    drop(pipeline);
    dispatcher.shutdown();
    info!("Bridge encerrado");
}
