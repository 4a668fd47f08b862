//! # Sensornet Gateway
//!
//! Recebe payloads dos nós (indoor, outdoor, repetidora), decodifica e
//! escreve uma mensagem de telemetria JSON por linha no stdout.
//!
//! ## Uso
//! ```bash
//! sensornet_gateway                       # UDP, porta do config.toml
//! sensornet_gateway --port 7000
//! echo 0164 | sensornet_gateway --stdin   # uma mensagem por linha
//! ```

mod net_thread;

use clap::Parser;
use net_thread::{spawn_stdin_thread, spawn_udp_thread};
use sensornet_core::config::AppConfig;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "sensornet_gateway", version, about = "Decodifica payloads dos nós")]
struct Cli {
    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Lê mensagens do stdin em vez de UDP
    #[arg(long)]
    stdin: bool,

    /// Sobrescreve a porta UDP do config
    #[arg(long)]
    port: Option<u16>,
}

fn main() {
    // ── Logging ── (stderr: stdout é a saída de dados)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ── Carregar config ──
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    for e in config.validate() {
        warn!("Config: {e}");
    }

    let spawned = if cli.stdin {
        spawn_stdin_thread(config.gateway.channel_capacity)
    } else {
        spawn_udp_thread(&config.gateway)
    };
    let rx = match spawned {
        Ok(rx) => rx,
        Err(e) => {
            error!("Falha ao criar thread de entrada: {e}");
            std::process::exit(1);
        }
    };

    // ── Loop principal ──
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut forwarded: u64 = 0;

    for msg in rx {
        let line = match serde_json::to_string(&msg.message) {
            Ok(line) => line,
            Err(e) => {
                error!("Erro ao serializar mensagem: {e}");
                continue;
            }
        };

        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            error!("Erro ao escrever no stdout: {e}");
            break;
        }

        forwarded += 1;
        debug!(
            "← {} bytes de {} | nó {} | total {forwarded}",
            msg.raw_size,
            msg.source_addr,
            msg.message.record.get("node").unwrap_or(&serde_json::Value::Null)
        );
    }

    info!("Gateway encerrado ({forwarded} mensagens)");
}
