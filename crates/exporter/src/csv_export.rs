//! Geração do CSV: uma linha por timestamp, uma coluna por chave.

use crate::error::ExportError;
use crate::thingsboard::TimeSeries;
use chrono::{DateTime, TimeZone};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Janela `[agora - dias, agora]` em ms desde a época.
pub fn export_window(now_ms: i64, window_days: u32) -> (i64, i64) {
    (now_ms - i64::from(window_days) * DAY_MS, now_ms)
}

/// Nome do arquivo: `<prefixo>_YYYY-MM-DD_HH-MM-SS.csv` no fuso de `now`.
pub fn generate_filename<Tz: TimeZone>(prefix: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!("{prefix}_{}.csv", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Texto da célula. Strings sem aspas; `null` vira vazio.
fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Monta o CSV com cabeçalho `timestamp,<chaves...>`. Retorna o texto e o
/// número de linhas de dados.
///
/// Os timestamps de todas as séries são unidos e ordenados; células sem
/// valor naquele instante ficam vazias. A primeira coluna é formatada em
/// `YYYY-MM-DD HH:MM:SS` no fuso `tz`.
pub fn to_csv<Tz: TimeZone>(series: &TimeSeries, tz: &Tz) -> Result<(String, usize), ExportError>
where
    Tz::Offset: Display,
{
    let timestamps: BTreeSet<i64> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.ts))
        .collect();

    let lookup: Vec<HashMap<i64, &Value>> = series
        .iter()
        .map(|s| s.points.iter().map(|p| (p.ts, &p.value)).collect())
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let mut header = vec!["timestamp".to_string()];
    header.extend(series.iter().map(|s| s.key.clone()));
    writer.write_record(&header)?;

    let rows = timestamps.len();
    for ts in timestamps {
        let local = match tz.timestamp_millis_opt(ts).single() {
            Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => ts.to_string(),
        };

        let mut row = Vec::with_capacity(series.len() + 1);
        row.push(local);
        row.extend(
            lookup
                .iter()
                .map(|values| values.get(&ts).map(|v| cell(v)).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    Ok((text, rows))
}
