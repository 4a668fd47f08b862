//! Threads de entrada: UDP ou stdin → decodificação → channel para a saída.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use sensornet_core::config::GatewayConfig;
use sensornet_core::protocol::{DecodeError, IngestMessage, OutboundMessage, decode_message};
use std::io::BufRead;
use std::net::UdpSocket;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Mensagem decodificada enviada para a thread principal.
#[derive(Debug, Clone)]
pub struct NetMessage {
    pub message: OutboundMessage,
    pub source_addr: String,
    pub raw_size: usize,
}

/// Interpreta e decodifica um datagrama ou linha.
pub fn handle_input(text: &str) -> Result<OutboundMessage, DecodeError> {
    decode_message(IngestMessage::parse(text))
}

/// O que fazer quando o channel está cheio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Espera espaço (stdin: nenhuma linha é perdida)
    Block,
    /// Descarta a mensagem (UDP: não segura o socket)
    DropWhenFull,
}

/// Decodifica e publica. Retorna `false` quando o lado receptor fechou.
fn publish(
    tx: &Sender<NetMessage>,
    text: &str,
    source: &str,
    raw_size: usize,
    delivery: Delivery,
) -> bool {
    let message = match handle_input(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Mensagem descartada de {source}: {e}");
            return true;
        }
    };

    let msg = NetMessage {
        message,
        source_addr: source.to_string(),
        raw_size,
    };
    match delivery {
        Delivery::Block => tx.send(msg).is_ok(),
        Delivery::DropWhenFull => match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Channel cheio, descartando mensagem de {source}");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        },
    }
}

/// Inicia a thread UDP. Retorna o receiver do channel.
pub fn spawn_udp_thread(config: &GatewayConfig) -> std::io::Result<Receiver<NetMessage>> {
    let (tx, rx) = bounded::<NetMessage>(config.channel_capacity);
    let config = config.clone();

    std::thread::Builder::new()
        .name("udp-receiver".into())
        .spawn(move || receiver_loop(&tx, &config))?;

    Ok(rx)
}

/// Inicia a thread de leitura do stdin (uma mensagem por linha).
pub fn spawn_stdin_thread(capacity: usize) -> std::io::Result<Receiver<NetMessage>> {
    let (tx, rx) = bounded::<NetMessage>(capacity);

    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            forward_lines(stdin.lock(), &tx);
            info!("Fim do stdin");
        })?;

    Ok(rx)
}

/// Publica cada linha não vazia, esperando a saída quando o channel enche.
fn forward_lines<R: BufRead>(reader: R, tx: &Sender<NetMessage>) {
    for line in reader.lines() {
        match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => {
                if !publish(tx, &line, "stdin", line.len(), Delivery::Block) {
                    break;
                }
            }
            Err(e) => {
                error!("Erro ao ler stdin: {e}");
                break;
            }
        }
    }
}

fn receiver_loop(tx: &Sender<NetMessage>, config: &GatewayConfig) {
    let bind_ip = if config.bind_ip.is_empty() {
        "0.0.0.0"
    } else {
        config.bind_ip.as_str()
    };
    let port = config.port;

    loop {
        match UdpSocket::bind(format!("{bind_ip}:{port}")) {
            Ok(sock) => {
                let mode = if config.source_ip.is_empty() {
                    "qualquer origem"
                } else {
                    config.source_ip.as_str()
                };
                info!("Gateway escutando em {bind_ip}:{port} – Origem: {mode}");
                serve_socket(&sock, tx, &config.source_ip);
                return;
            }
            Err(e) => {
                error!("Falha ao bind porta {port}: {e}. Tentando novamente em 2s...");
                std::thread::sleep(Duration::from_secs(2));
            }
        }
    }
}

/// Lê datagramas até o channel ser fechado.
fn serve_socket(sock: &UdpSocket, tx: &Sender<NetMessage>, source_filter: &str) {
    sock.set_read_timeout(Some(Duration::from_secs(1))).ok();

    let mut buf = [0u8; 2048];
    loop {
        match sock.recv_from(&mut buf) {
            Ok((size, addr)) => {
                let source = addr.ip().to_string();

                if !source_filter.is_empty() && source != source_filter {
                    debug!("Ignorando datagrama de {source} (esperado: {source_filter})");
                    continue;
                }

                let text = String::from_utf8_lossy(&buf[..size]);
                if !publish(tx, &text, &source, size, Delivery::DropWhenFull) {
                    info!("Saída encerrada, parando thread UDP");
                    return;
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // Timeout normal, continua
            }
            Err(e) => {
                warn!("Erro ao receber UDP: {e}");
            }
        }
    }
}
