//! Erros do exporter.

/// Qualquer falha em uma etapa da exportação. Todas encerram a execução.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Erro HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Erro de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Erro de CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Endereço de e-mail inválido: {0}")]
    MailAddress(#[from] lettre::address::AddressError),

    #[error("Erro ao montar e-mail: {0}")]
    MailBuild(#[from] lettre::error::Error),

    #[error("E-mail: {0}")]
    Mail(String),

    #[error("{0}")]
    ConfigFile(#[from] sensornet_core::config::ConfigError),

    #[error("Nenhum refresh_token em {0}. Rode `sensornet_exporter auth` uma vez.")]
    MissingRefreshToken(String),

    #[error("Configuração incompleta: {0}")]
    Config(String),
}
