//! Execução completa do export: busca → CSV → e-mail → upload.

use crate::csv_export::{export_window, generate_filename, to_csv};
use crate::dropbox::FileUploader;
use crate::error::ExportError;
use crate::mail::{MailMessage, MailTransport};
use crate::thingsboard::TelemetrySource;
use chrono::{DateTime, TimeZone};
use sensornet_core::config::ExporterConfig;
use std::fmt::Display;
use tracing::info;

/// Resultado de uma execução.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub csv: String,
    /// Linhas de dados (sem o cabeçalho)
    pub rows: usize,
    pub mailed: bool,
    /// Caminho final no destino de upload
    pub uploaded: Option<String>,
}

/// Roda o export para a janela que termina em `now`.
///
/// Etapas sem transporte (`None`) são puladas.
pub fn run_export<Tz: TimeZone>(
    config: &ExporterConfig,
    source: &dyn TelemetrySource,
    mailer: Option<&dyn MailTransport>,
    uploader: Option<&dyn FileUploader>,
    now: &DateTime<Tz>,
) -> Result<ExportArtifact, ExportError>
where
    Tz::Offset: Display,
{
    let (start_ms, end_ms) = export_window(now.timestamp_millis(), config.window_days);
    let filename = generate_filename(&config.filename_prefix, now);

    info!("Buscando dados…");
    let tb = &config.thingsboard;
    let series = source.fetch(&tb.keys, start_ms, end_ms, tb.limit)?;

    info!("Gerando CSV...");
    let (csv, rows) = to_csv(&series, &now.timezone())?;
    info!("{filename}: {rows} linhas, {} colunas", series.len() + 1);

    let mailed = match mailer {
        Some(mailer) => {
            info!("Enviando e-mail…");
            mailer.send(&MailMessage::csv_export(&config.mail, &filename, &csv))?;
            true
        }
        None => false,
    };

    let uploaded = match uploader {
        Some(uploader) => {
            info!("Upload para o Dropbox…");
            Some(uploader.upload(&format!("/{filename}"), csv.as_bytes())?)
        }
        None => None,
    };

    info!("Concluído");
    Ok(ExportArtifact {
        filename,
        csv,
        rows,
        mailed,
        uploaded,
    })
}
