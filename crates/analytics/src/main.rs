//! # Digital Twin Analytics
//!
//! Calcula o relatório da janela móvel (count/média/máx/mín) a partir do
//! PostgreSQL e, no modo de alerta `report`, checa a última leitura contra
//! o threshold.
//!
//! ## Uso
//! ```bash
//! twin_analytics          # a cada report.interval_secs
//! twin_analytics --once   # um ciclo e sai
//! ```

use std::time::Instant;
use tracing::{error, info, warn};
use twin_core::alerts::{Evaluation, EvaluationMode};
use twin_core::config::AppConfig;
use twin_core::notifier::{AlertDispatcher, notifier_from_config};
use twin_core::postgres_store::PostgresStore;
use twin_core::report::{self, ReportCycle, ReportSettings};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let once = std::env::args().any(|a| a == "--once");

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let mut config = AppConfig::load(&config_path);
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
        Ok(store) => store,
        Err(e) => {
            error!("Falha ao configurar o PostgreSQL: {e}");
            std::process::exit(1);
        }
    };

    // ── Alertas ──
    let settings = ReportSettings {
        window: config.report.window(),
        threshold: (config.alerts.mode == EvaluationMode::Report)
            .then_some(config.alerts.threshold),
    };
    if settings.threshold.is_none() {
        info!(
            "Modo de alerta {:?}: o bridge avalia o threshold, relatório só agrega",
            config.alerts.mode
        );
    }
    let dispatcher = match notifier_from_config(&config.email)
        .map_err(|e| e.to_string())
        .and_then(|n| {
            AlertDispatcher::spawn(n, config.alerts.queue_capacity).map_err(|e| e.to_string())
        }) {
        Ok(d) => d,
        Err(e) => {
            error!("Falha ao iniciar alertas: {e}");
            std::process::exit(1);
        }
    };
    let queue = dispatcher.queue();

    // ── Loop principal ──
    let interval = config.report.interval();
    loop {
        let cycle_start = Instant::now();

        match report::run_cycle(&store, &settings, Some(&queue)) {
            Ok(cycle) => print_cycle(&cycle),
            Err(e) => error!("Erro no banco: {e}"),
        }

        if once {
            break;
        }

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    // Garante o envio dos alertas pendentes antes de sair
    drop(queue);
    dispatcher.shutdown();
}

fn print_cycle(cycle: &ReportCycle) {
    println!();
    println!("{}", cycle.report);
    match &cycle.latest {
        Some((reading, Evaluation::Breach)) => {
            warn!("Temperatura alta detectada: {:.2}°C", reading.temperature);
        }
        Some((reading, Evaluation::NoBreach)) => {
            println!("  Status: normal ({:.2}°C)", reading.temperature);
        }
        None => {}
    }
    println!();
}
