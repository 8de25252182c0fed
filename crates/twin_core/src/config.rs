//! Configuração unificada via TOML.
//!
//! Um único `config.toml` para bridge e analytics. Credenciais podem vir do
//! ambiente (mesmos nomes do antigo `.env`) e sobrepõem o arquivo.

use crate::alerts::EvaluationMode;
use crate::postgres_store::is_valid_identifier;
use crate::protocol::PayloadFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Variável de ambiente com o caminho do config.
pub const CONFIG_ENV: &str = "TWIN_CONFIG";

/// Conexão com o broker MQTT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Tópico assinado
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Variante de payload do tópico: "json" ou "scalar"
    pub payload_format: PayloadFormat,
    /// Mensagens em trânsito entre a thread MQTT e o pipeline
    pub inbox_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".into(),
            port: 1883,
            topic: "curriculum/iot/smart_data".into(),
            client_id: "digital-twin-bridge".into(),
            keep_alive_secs: 60,
            payload_format: PayloadFormat::Json,
            inbox_capacity: 64,
        }
    }
}

/// Conexão com o PostgreSQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub schema: String,
    pub pool_size: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: String::new(),
            dbname: "postgres".into(),
            schema: "edu_iot_digital_twin_lab".into(),
            pool_size: 4,
            connect_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    /// String de conexão libpq (`chave='valor' ...`).
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            format!("host={}", quote_conn_value(&self.host)),
            format!("port={}", self.port),
            format!("user={}", quote_conn_value(&self.user)),
            format!("dbname={}", quote_conn_value(&self.dbname)),
            format!("connect_timeout={}", self.connect_timeout_secs),
        ];
        if !self.password.is_empty() {
            parts.push(format!("password={}", quote_conn_value(&self.password)));
        }
        parts.join(" ")
    }
}

/// Aspas simples com escape de `\` e `'`.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// Threshold e modo de avaliação.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Limite em °C (breach se estritamente maior)
    pub threshold: f64,
    /// "ingested", "latest" ou "report"
    pub mode: EvaluationMode,
    /// Alertas aguardando envio
    pub queue_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold: 30.0,
            mode: EvaluationMode::Ingested,
            queue_capacity: 16,
        }
    }
}

/// Envio de alertas por e-mail (SMTP com TLS implícito).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Remetente e login SMTP
    pub sender: String,
    pub receiver: String,
    pub password: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.gmail.com".into(),
            smtp_port: 465,
            sender: String::new(),
            receiver: String::new(),
            password: String::new(),
        }
    }
}

/// Relatório periódico.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub window_hours: u32,
    pub interval_secs: u64,
    /// Se o bridge também roda o relatório (mesmo pool de conexões)
    pub in_process: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            interval_secs: 3600,
            in_process: false,
        }
    }
}

impl ReportConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.window_hours))
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}

/// Configuração raiz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub database: DatabaseConfig,
    pub alerts: AlertConfig,
    pub email: EmailConfig,
    pub report: ReportConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Caminho do config: `$TWIN_CONFIG` ou `config.toml` ao lado do executável.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Aplica credenciais do ambiente do processo.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Aplica overrides a partir de uma função de lookup (variáveis vazias
    /// são ignoradas).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = get("DB_PORT") {
            match v.parse() {
                Ok(port) => self.database.port = port,
                Err(_) => warn!("DB_PORT inválida ignorada: {v}"),
            }
        }
        if let Some(v) = get("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = get("DB_PASS") {
            self.database.password = v;
        }
        if let Some(v) = get("DB_NAME") {
            self.database.dbname = v;
        }
        if let Some(v) = get("EMAIL_SENDER") {
            self.email.sender = v;
        }
        if let Some(v) = get("EMAIL_RECEIVER") {
            self.email.receiver = v;
        }
        if let Some(v) = get("EMAIL_PASSWORD") {
            self.email.password = v;
        }
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.broker.host.is_empty() {
            errors.push("Host do broker não pode ser vazio".into());
        }
        if self.broker.port == 0 {
            errors.push("Porta do broker não pode ser 0".into());
        }
        if self.broker.topic.is_empty() || self.broker.topic.contains(['+', '#']) {
            errors.push(format!(
                "Tópico inválido: '{}' (deve ser um tópico concreto, sem curingas)",
                self.broker.topic
            ));
        }
        if self.broker.inbox_capacity == 0 {
            errors.push("inbox_capacity deve ser maior que 0".into());
        }
        if self.database.port == 0 {
            errors.push("Porta do banco não pode ser 0".into());
        }
        if !is_valid_identifier(&self.database.schema) {
            errors.push(format!("Schema inválido: '{}'", self.database.schema));
        }
        if self.database.pool_size == 0 {
            errors.push("pool_size deve ser maior que 0".into());
        }
        if !self.alerts.threshold.is_finite() {
            errors.push(format!("Threshold inválido: {}", self.alerts.threshold));
        }
        if self.alerts.queue_capacity == 0 {
            errors.push("queue_capacity deve ser maior que 0".into());
        }
        if self.email.enabled {
            if self.email.sender.is_empty() || self.email.receiver.is_empty() {
                errors.push("E-mail habilitado sem remetente/destinatário".into());
            }
            if self.email.smtp_host.is_empty() {
                errors.push("E-mail habilitado sem smtp_host".into());
            }
        }
        if self.report.window_hours == 0 {
            errors.push("window_hours deve ser maior que 0".into());
        }
        if self.report.interval_secs == 0 {
            errors.push("interval_secs deve ser maior que 0".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.broker.topic, parsed.broker.topic);
        assert_eq!(config.alerts.mode, parsed.alerts.mode);
        assert_eq!(config.broker.payload_format, parsed.broker.payload_format);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[broker]
topic = "edu/iot/temp"
payload_format = "scalar"

[alerts]
threshold = 70.0
mode = "report"
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.broker.topic, "edu/iot/temp");
        assert_eq!(config.broker.payload_format, PayloadFormat::Scalar);
        assert_eq!(config.alerts.threshold, 70.0);
        assert_eq!(config.alerts.mode, EvaluationMode::Report);
        // Outros campos devem ter valor padrão
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.report.window_hours, 24);
    }

    #[test]
    fn env_overrides_credentials() {
        let env: HashMap<&str, &str> = [
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_PASS", "s3cret"),
            ("DB_NAME", ""),
            ("EMAIL_SENDER", "twin@example.com"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.password, "s3cret");
        // Vazia não sobrescreve
        assert_eq!(config.database.dbname, "postgres");
        assert_eq!(config.email.sender, "twin@example.com");
        assert!(config.email.receiver.is_empty());
    }

    #[test]
    fn bad_port_override_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides_from(|k| (k == "DB_PORT").then(|| "abc".to_string()));
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn connection_string_quotes_values() {
        let db = DatabaseConfig {
            password: r"it's\x".into(),
            ..Default::default()
        };
        let conn = db.connection_string();
        assert!(conn.contains("host='localhost'"));
        assert!(conn.contains("port=5432"));
        assert!(conn.contains(r"password='it\'s\\x'"));
        assert!(conn.parse::<postgres::Config>().is_ok());
    }

    #[test]
    fn empty_password_is_omitted() {
        let conn = DatabaseConfig::default().connection_string();
        assert!(!conn.contains("password"));
    }

    #[test]
    fn validate_catches_bad_values() {
        let mut config = AppConfig::default();
        config.broker.topic = "sensors/#".into();
        config.database.schema = "Bad-Schema".into();
        config.alerts.threshold = f64::NAN;
        config.email.enabled = true;
        let errors = config.validate();
        assert_eq!(errors.len(), 4, "Erros: {:?}", errors);
    }
}
