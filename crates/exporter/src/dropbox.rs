//! Upload para o Dropbox com OAuth (refresh token).
//!
//! Os tokens ficam em um arquivo JSON `{access_token, refresh_token,
//! expires_at}` (ms desde a época). O access token é renovado quando falta
//! menos de [`REFRESH_MARGIN_MS`] para expirar.

use crate::error::ExportError;
use reqwest::Url;
use reqwest::blocking::Client;
use sensornet_core::config::DropboxConfig;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";
const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
const UPLOAD_URL: &str = "https://content.dropboxapi.com/2/files/upload";

/// Renovação antecipada do access token.
pub const REFRESH_MARGIN_MS: i64 = 60_000;

// ──────────────────────────────────────────────
// Tokens
// ──────────────────────────────────────────────

/// Conteúdo do arquivo de tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenSet {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiração em ms desde a época
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl TokenSet {
    pub fn needs_refresh(&self, now_ms: i64) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => expires_at - REFRESH_MARGIN_MS < now_ms,
            _ => true,
        }
    }

    /// Aplica a resposta do endpoint de token.
    fn apply(&mut self, resp: TokenResponse, now_ms: i64) {
        self.access_token = Some(resp.access_token);
        self.expires_at = Some(now_ms + resp.expires_in.unwrap_or(0) * 1000);
        if resp.refresh_token.is_some() {
            self.refresh_token = resp.refresh_token;
        }
    }
}

/// Resposta de `/oauth2/token`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Arquivo de tokens em disco.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` se o arquivo não existe ou não é JSON válido.
    pub fn load(&self) -> Option<TokenSet> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                debug!("{} inválido: {e}", self.path.display());
                None
            }
        }
    }

    /// Grava com permissão 0600 (unix).
    pub fn save(&self, tokens: &TokenSet) -> Result<(), ExportError> {
        let content = serde_json::to_string_pretty(tokens)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// OAuth
// ──────────────────────────────────────────────

/// Endpoint de emissão de tokens.
pub trait TokenEndpoint {
    fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ExportError>;
    fn exchange_code(&self, code: &str) -> Result<TokenResponse, ExportError>;
}

/// Credenciais do app Dropbox.
pub struct DropboxOAuth {
    http: Client,
    app_key: String,
    app_secret: String,
    redirect_uri: String,
}

impl DropboxOAuth {
    pub fn new(config: &DropboxConfig) -> Result<Self, ExportError> {
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(60)).build()?,
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// URL de autorização (acesso offline → refresh token).
    pub fn authorize_url(&self) -> Result<Url, ExportError> {
        Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.app_key.as_str()),
                ("token_access_type", "offline"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .map_err(|e| ExportError::Config(format!("URL de autorização: {e}")))
    }

    fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, ExportError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.app_key.as_str()));
        form.push(("client_secret", self.app_secret.as_str()));

        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&form)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(resp)
    }
}

impl TokenEndpoint for DropboxOAuth {
    fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ExportError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
    }

    fn exchange_code(&self, code: &str) -> Result<TokenResponse, ExportError> {
        self.token_request(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
    }
}

/// Mantém o access token válido, persistindo cada renovação.
pub struct TokenManager<E: TokenEndpoint> {
    store: TokenStore,
    endpoint: E,
}

impl<E: TokenEndpoint> TokenManager<E> {
    pub fn new(store: TokenStore, endpoint: E) -> Self {
        Self { store, endpoint }
    }

    /// Access token válido em `now_ms`, renovando se necessário.
    pub fn access_token(&self, now_ms: i64) -> Result<String, ExportError> {
        let missing = || ExportError::MissingRefreshToken(self.store.path().display().to_string());

        let mut tokens = self.store.load().ok_or_else(missing)?;
        let refresh_token = tokens.refresh_token.clone().ok_or_else(missing)?;

        if tokens.needs_refresh(now_ms) {
            let resp = self.endpoint.refresh(&refresh_token)?;
            tokens.apply(resp, now_ms);
            self.store.save(&tokens)?;
            info!(
                "Access token do Dropbox renovado, expira em {}",
                tokens
                    .expires_at
                    .and_then(chrono::DateTime::from_timestamp_millis)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default()
            );
        }

        tokens.access_token.ok_or_else(missing)
    }

    /// Troca o código de autorização e grava os tokens.
    pub fn authorize(&self, code: &str, now_ms: i64) -> Result<TokenSet, ExportError> {
        let resp = self.endpoint.exchange_code(code)?;
        let mut tokens = TokenSet::default();
        tokens.apply(resp, now_ms);
        self.store.save(&tokens)?;
        info!("Tokens salvos em {}", self.store.path().display());
        Ok(tokens)
    }
}

/// Porta local do listener: a do redirect URI, ou 3000 se ele não tiver uma.
fn redirect_port(url: &Url) -> u16 {
    url.port().unwrap_or(3000)
}

/// Espera um único `GET /...?code=...` no endereço do redirect URI.
pub fn wait_for_code(redirect_uri: &str) -> Result<String, ExportError> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| ExportError::Config(format!("redirect_uri inválido: {e}")))?;
    let port = redirect_port(&url);

    let listener = TcpListener::bind(("127.0.0.1", port))?;
    info!("Aguardando redirect em 127.0.0.1:{port}...");

    loop {
        let (stream, _) = listener.accept()?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        let code = request_line
            .split_whitespace()
            .nth(1)
            .and_then(|target| url.join(target).ok())
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "code")
                    .map(|(_, v)| v.into_owned())
            });

        let mut stream = stream;
        match code {
            Some(code) => {
                let body = "O token foi salvo. Pode fechar esta janela.";
                write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )?;
                return Ok(code);
            }
            None => {
                stream.write_all(
                    b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                )?;
            }
        }
    }
}

// ──────────────────────────────────────────────
// Upload
// ──────────────────────────────────────────────

/// Destino de upload de arquivos.
pub trait FileUploader {
    /// Envia `contents` para `path`, sobrescrevendo. Retorna o caminho final.
    fn upload(&self, path: &str, contents: &[u8]) -> Result<String, ExportError>;
}

#[derive(Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'static str,
}

#[derive(Deserialize)]
struct UploadResult {
    path_display: String,
}

/// Upload via API de conteúdo do Dropbox.
pub struct DropboxUploader<E: TokenEndpoint> {
    http: Client,
    tokens: TokenManager<E>,
}

impl<E: TokenEndpoint> DropboxUploader<E> {
    pub fn new(tokens: TokenManager<E>) -> Result<Self, ExportError> {
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(300)).build()?,
            tokens,
        })
    }
}

impl<E: TokenEndpoint> FileUploader for DropboxUploader<E> {
    fn upload(&self, path: &str, contents: &[u8]) -> Result<String, ExportError> {
        let access_token = self
            .tokens
            .access_token(chrono::Utc::now().timestamp_millis())?;
        let arg = serde_json::to_string(&UploadArg {
            path,
            mode: "overwrite",
        })?;

        let result: UploadResult = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(access_token)
            .header("Dropbox-API-Arg", arg)
            .header("Content-Type", "application/octet-stream")
            .body(contents.to_vec())
            .send()?
            .error_for_status()?
            .json()?;

        info!("Upload no Dropbox: {}", result.path_display);
        Ok(result.path_display)
    }
}
