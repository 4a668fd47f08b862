//! Configuração unificada via TOML.
//!
//! Um único `config.toml` com as seções `[gateway]` e `[exporter]`.
//! Segredos podem vir de variáveis de ambiente (mesmos nomes do antigo
//! `config.env`), aplicadas por [`AppConfig::apply_env`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Falha ao gravar o config.toml.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{} já existe (use --force para sobrescrever)", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Erro ao serializar config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao gravar config: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuração do Gateway (decodificação dos payloads).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// IP local para bind (vazio = todas as interfaces)
    pub bind_ip: String,
    /// Porta UDP de entrada
    pub port: u16,
    /// Aceita apenas datagramas deste IP (vazio = qualquer)
    pub source_ip: String,
    /// Capacidade do channel entre a thread de rede e a saída
    pub channel_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_ip: String::new(),
            port: 5006,
            source_ip: String::new(),
            channel_capacity: 64,
        }
    }
}

/// Chaves de série temporal exportadas por padrão.
pub const DEFAULT_EXPORT_KEYS: &[&str] = &[
    "node",
    "InNodeBatSOC",
    "InNodeBatStatus",
    "fridgeTemp",
    "fridgeHum",
    "InDHTStatus",
    "mainBatSOC",
    "mainBatVoltage",
    "mainBatCurrent",
    "consumed_mAh",
    "chargeCycles",
    "SmartShuntStatus",
    "eBikeState1",
    "eBikeState2",
    "OutNodeBatSOC",
    "outNodeBatStatus",
    "outTemp",
    "outHum",
    "OutDHTStatus",
    "illuminance",
    "OutLightStatus",
    "windspeed",
    "OutWindStatus",
    "repNodeBatSOC",
    "repNodeBatStatus",
];

/// Acesso ao backend ThingsBoard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThingsBoardConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub device_id: String,
    /// Chaves consultadas (ordem = ordem das colunas do CSV)
    pub keys: Vec<String>,
    /// Máximo de pontos por chave
    pub limit: u32,
}

impl Default for ThingsBoardConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            username: String::new(),
            password: String::new(),
            device_id: String::new(),
            keys: DEFAULT_EXPORT_KEYS.iter().map(|k| k.to_string()).collect(),
            limit: 50_000,
        }
    }
}

/// Envio do CSV por e-mail (SMTP).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    /// Remetente (vazio = `smtp_user`)
    pub from: String,
    /// Exige STARTTLS; sem isso o upgrade é oportunista
    pub require_tls: bool,
    /// Destinatário
    pub to: String,
    pub subject: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_host: "localhost".into(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_pass: String::new(),
            from: String::new(),
            require_tls: true,
            to: String::new(),
            subject: "ThingsBoard: 7-day-CSV-Export".into(),
        }
    }
}

impl MailConfig {
    /// Endereço do remetente.
    pub fn sender(&self) -> &str {
        if self.from.is_empty() {
            &self.smtp_user
        } else {
            &self.from
        }
    }
}

/// Upload para o Dropbox (OAuth com refresh token).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxConfig {
    pub enabled: bool,
    pub app_key: String,
    pub app_secret: String,
    pub redirect_uri: String,
    /// Arquivo com `{access_token, refresh_token, expires_at}`
    pub token_file: String,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_key: String::new(),
            app_secret: String::new(),
            redirect_uri: "http://localhost:3000/auth".into(),
            token_file: "dropbox_tokens.json".into(),
        }
    }
}

/// Configuração do Exporter (CSV semanal).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Janela exportada, em dias até agora
    pub window_days: u32,
    /// Prefixo do nome do arquivo CSV
    pub filename_prefix: String,
    pub thingsboard: ThingsBoardConfig,
    pub mail: MailConfig,
    pub dropbox: DropboxConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            filename_prefix: "tezhumke_7days_data_export".into(),
            thingsboard: ThingsBoardConfig::default(),
            mail: MailConfig::default(),
            dropbox: DropboxConfig::default(),
        }
    }
}

/// Configuração raiz do aplicativo (gateway e exporter).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub exporter: ExporterConfig,
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

    /// Grava a configuração como TOML.
    ///
    /// Um arquivo existente só é substituído com `overwrite`.
    pub fn save(&self, path: &Path, overwrite: bool) -> Result<(), ConfigError> {
        if path.exists() && !overwrite {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Sobrescreve campos com variáveis de ambiente presentes e não vazias.
    ///
    /// `lookup` normalmente é `|k| std::env::var(k).ok()`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let tb = &mut self.exporter.thingsboard;
        let mail = &mut self.exporter.mail;
        let dbx = &mut self.exporter.dropbox;

        let string_fields: [(&str, &mut String); 12] = [
            ("TB_URL", &mut tb.url),
            ("TB_USER", &mut tb.username),
            ("TB_PASS", &mut tb.password),
            ("DEVICE_ID", &mut tb.device_id),
            ("SMTP_HOST", &mut mail.smtp_host),
            ("SMTP_USER", &mut mail.smtp_user),
            ("SMTP_PASS", &mut mail.smtp_pass),
            ("MAIL_FROM", &mut mail.from),
            ("MAIL_TO", &mut mail.to),
            ("DROPBOX_APP_KEY", &mut dbx.app_key),
            ("DROPBOX_APP_SECRET", &mut dbx.app_secret),
            ("DROPBOX_REDIRECT_URI", &mut dbx.redirect_uri),
        ];
        for (key, field) in string_fields {
            if let Some(value) = get(key) {
                debug!("{key} definido pelo ambiente");
                *field = value;
            }
        }

        if let Some(port) = get("SMTP_PORT") {
            match port.parse() {
                Ok(p) => mail.smtp_port = p,
                Err(_) => warn!("SMTP_PORT inválida no ambiente: {port}"),
            }
        }
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.gateway.port == 0 {
            errors.push("Porta do gateway não pode ser 0".into());
        }
        if self.gateway.channel_capacity == 0 {
            errors.push("Capacidade do channel do gateway não pode ser 0".into());
        }

        let exporter = &self.exporter;
        if exporter.window_days == 0 || exporter.window_days > 366 {
            errors.push(format!(
                "Janela de exportação inválida: {} dias (1–366)",
                exporter.window_days
            ));
        }
        if exporter.thingsboard.keys.is_empty() {
            errors.push("Nenhuma chave de telemetria configurada".into());
        }
        if exporter.thingsboard.limit == 0 {
            errors.push("Limite de pontos não pode ser 0".into());
        }
        if exporter.mail.enabled && exporter.mail.smtp_port == 0 {
            errors.push("Porta SMTP não pode ser 0".into());
        }

        errors
    }

    /// Erros que impedem o exporter de rodar (credenciais ausentes).
    pub fn exporter_missing(&self) -> Vec<&'static str> {
        let exporter = &self.exporter;
        let mut missing = Vec::new();

        if exporter.thingsboard.username.is_empty() {
            missing.push("TB_USER");
        }
        if exporter.thingsboard.device_id.is_empty() {
            missing.push("DEVICE_ID");
        }
        if exporter.mail.enabled && exporter.mail.to.is_empty() {
            missing.push("MAIL_TO");
        }
        if exporter.mail.enabled && exporter.mail.sender().is_empty() {
            missing.push("MAIL_FROM/SMTP_USER");
        }
        if exporter.dropbox.enabled
            && (exporter.dropbox.app_key.is_empty() || exporter.dropbox.app_secret.is_empty())
        {
            missing.push("DROPBOX_APP_KEY/DROPBOX_APP_SECRET");
        }

        missing
    }
}
