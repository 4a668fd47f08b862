//! Consulta de séries temporais no ThingsBoard (REST).

use crate::error::ExportError;
use reqwest::blocking::Client;
use sensornet_core::config::ThingsBoardConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Um ponto de uma série: timestamp (ms) e valor como veio do backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TsPoint {
    pub ts: i64,
    pub value: Value,
}

/// Série de uma chave.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySeries {
    pub key: String,
    pub points: Vec<TsPoint>,
}

/// Séries na ordem das colunas do CSV.
pub type TimeSeries = Vec<KeySeries>;

/// Origem das séries temporais exportadas.
pub trait TelemetrySource {
    fn fetch(
        &self,
        keys: &[String],
        start_ms: i64,
        end_ms: i64,
        limit: u32,
    ) -> Result<TimeSeries, ExportError>;
}

/// Ordena a resposta pelas chaves pedidas. Chaves sem dados são omitidas.
pub fn order_series(keys: &[String], mut raw: HashMap<String, Vec<TsPoint>>) -> TimeSeries {
    let mut series: TimeSeries = keys
        .iter()
        .filter_map(|key| {
            raw.remove(key).map(|points| KeySeries {
                key: key.clone(),
                points,
            })
        })
        .collect();

    // Chaves não pedidas (não deveria acontecer) vão no fim, em ordem alfabética
    let mut extra: Vec<_> = raw.into_iter().collect();
    extra.sort_by(|a, b| a.0.cmp(&b.0));
    series.extend(extra.into_iter().map(|(key, points)| KeySeries { key, points }));
    series
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Cliente autenticado (JWT) para um dispositivo.
pub struct ThingsBoardClient {
    http: Client,
    base_url: String,
    device_id: String,
    jwt: String,
}

impl ThingsBoardClient {
    /// `POST /api/auth/login` e guarda o JWT.
    pub fn login(config: &ThingsBoardConfig) -> Result<Self, ExportError> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let base_url = config.url.trim_end_matches('/').to_string();

        let resp: LoginResponse = http
            .post(format!("{base_url}/api/auth/login"))
            .json(&LoginRequest {
                username: &config.username,
                password: &config.password,
            })
            .send()?
            .error_for_status()?
            .json()?;

        info!("Login no ThingsBoard em {base_url} OK");
        Ok(Self {
            http,
            base_url,
            device_id: config.device_id.clone(),
            jwt: resp.token,
        })
    }
}

impl TelemetrySource for ThingsBoardClient {
    fn fetch(
        &self,
        keys: &[String],
        start_ms: i64,
        end_ms: i64,
        limit: u32,
    ) -> Result<TimeSeries, ExportError> {
        let url = format!(
            "{}/api/plugins/telemetry/DEVICE/{}/values/timeseries",
            self.base_url, self.device_id
        );
        let params = [
            ("startTs", start_ms.to_string()),
            ("endTs", end_ms.to_string()),
            ("keys", keys.join(",")),
            ("limit", limit.to_string()),
        ];

        let raw: HashMap<String, Vec<TsPoint>> = self
            .http
            .get(url)
            .bearer_auth(&self.jwt)
            .query(&params)
            .send()?
            .error_for_status()?
            .json()?;

        let series = order_series(keys, raw);
        debug!(
            "{} séries, {} pontos",
            series.len(),
            series.iter().map(|s| s.points.len()).sum::<usize>()
        );
        Ok(series)
    }
}
