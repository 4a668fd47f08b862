//! # Sensornet Exporter
//!
//! Exporta a telemetria dos últimos dias do ThingsBoard para CSV, envia por
//! e-mail e faz upload no Dropbox.
//!
//! ## Uso
//! ```bash
//! sensornet_exporter init-config          # grava o config.toml padrão
//! sensornet_exporter auth                 # uma vez: autoriza o Dropbox
//! sensornet_exporter run                  # export completo
//! sensornet_exporter run --skip-mail --output export.csv
//! ```

mod csv_export;
mod dropbox;
mod error;
mod mail;
mod pipeline;
mod thingsboard;

use clap::{Parser, Subcommand};
use dropbox::{DropboxOAuth, DropboxUploader, FileUploader, TokenManager, TokenStore};
use error::ExportError;
use mail::{MailTransport, SmtpMailer};
use sensornet_core::config::AppConfig;
use std::path::PathBuf;
use thingsboard::ThingsBoardClient;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "sensornet_exporter", version, about = "Export semanal da telemetria")]
struct Cli {
    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Busca, gera CSV, envia e-mail e faz upload
    Run {
        /// Também grava o CSV neste caminho
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        skip_mail: bool,
        #[arg(long)]
        skip_upload: bool,
    },
    /// Grava um config.toml com os valores padrão
    InitConfig {
        /// Sobrescreve um arquivo existente
        #[arg(long)]
        force: bool,
    },
    /// Autoriza o app Dropbox e salva os tokens
    Auth {
        /// Código já obtido (sem esperar o redirect)
        #[arg(long)]
        code: Option<String>,
    },
}

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // ── Carregar config ──
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);
    config.apply_env(|key| std::env::var(key).ok());

    for e in config.validate() {
        warn!("Config: {e}");
    }

    let result = match cli.command {
        Command::Run {
            output,
            skip_mail,
            skip_upload,
        } => run(&mut config, output, skip_mail, skip_upload),
        Command::InitConfig { force } => AppConfig::default()
            .save(&config_path, force)
            .map_err(ExportError::from),
        Command::Auth { code } => auth(&config, code),
    };

    if let Err(e) = result {
        error!("Erro: {e}");
        std::process::exit(1);
    }
}

fn run(
    config: &mut AppConfig,
    output: Option<PathBuf>,
    skip_mail: bool,
    skip_upload: bool,
) -> Result<(), ExportError> {
    if skip_mail {
        config.exporter.mail.enabled = false;
    }
    if skip_upload {
        config.exporter.dropbox.enabled = false;
    }

    let missing = config.exporter_missing();
    if !missing.is_empty() {
        return Err(ExportError::Config(missing.join(", ")));
    }

    let exporter = &config.exporter;
    let now = chrono::Local::now();

    info!("Login…");
    let source = ThingsBoardClient::login(&exporter.thingsboard)?;

    let mailer = exporter
        .mail
        .enabled
        .then(|| SmtpMailer::new(&exporter.mail))
        .transpose()?;
    let uploader = if exporter.dropbox.enabled {
        let tokens = TokenManager::new(
            TokenStore::new(&exporter.dropbox.token_file),
            DropboxOAuth::new(&exporter.dropbox)?,
        );
        Some(DropboxUploader::new(tokens)?)
    } else {
        None
    };

    let artifact = pipeline::run_export(
        exporter,
        &source,
        mailer.as_ref().map(|m| m as &dyn MailTransport),
        uploader.as_ref().map(|u| u as &dyn FileUploader),
        &now,
    )?;

    if let Some(path) = output {
        std::fs::write(&path, &artifact.csv)?;
        info!("CSV gravado em {}", path.display());
    }

    info!(
        "{}: {} linhas | e-mail: {} | Dropbox: {}",
        artifact.filename,
        artifact.rows,
        if artifact.mailed { "enviado" } else { "pulado" },
        artifact.uploaded.as_deref().unwrap_or("pulado")
    );

    Ok(())
}

fn auth(config: &AppConfig, code: Option<String>) -> Result<(), ExportError> {
    let dbx = &config.exporter.dropbox;
    if dbx.app_key.is_empty() || dbx.app_secret.is_empty() {
        return Err(ExportError::Config(
            "DROPBOX_APP_KEY e DROPBOX_APP_SECRET são obrigatórios".into(),
        ));
    }

    let oauth = DropboxOAuth::new(dbx)?;
    let code = match code {
        Some(code) => code,
        None => {
            println!("Abra esta URL e autorize o app: {}", oauth.authorize_url()?);
            dropbox::wait_for_code(&dbx.redirect_uri)?
        }
    };

    let manager = TokenManager::new(TokenStore::new(&dbx.token_file), oauth);
    manager.authorize(&code, chrono::Utc::now().timestamp_millis())?;
    Ok(())
}
