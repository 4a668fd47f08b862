//! # Sensornet Core
//!
//! Crate compartilhada com o decodificador dos payloads dos nós (indoor,
//! outdoor e repetidora), os tipos dos registros, as mensagens do gateway e
//! a configuração TOML.
//!
//! ## Módulos
//! - [`crc`] – CRC-8 refletido dos nós
//! - [`input`] – Normalização hex / array / número → bytes
//! - [`decoder`] – Decodificação por tipo de nó
//! - [`types`] – Registros de telemetria e mapa plano de chaves
//! - [`protocol`] – Mensagens de entrada/saída e erros de decodificação
//! - [`config`] – Configuração unificada via TOML

pub mod config;
pub mod crc;
pub mod decoder;
pub mod input;
pub mod protocol;
pub mod types;

// Re-exports convenientes
pub use config::{AppConfig, ExporterConfig, GatewayConfig};
pub use decoder::decode;
pub use protocol::{DecodeError, IngestMessage, OutboundMessage, decode_message};
pub use types::TelemetryRecord;
