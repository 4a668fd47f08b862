//! Mensagens de ingestão e de saída do gateway.
//!
//! Entrada (JSON):
//!
//! ```text
//! { "payload": "0100EB...", "payloadHex"?: ..., "metadata"?: {...} }
//! ```
//!
//! Saída (JSON):
//!
//! ```text
//! { "record": { "node": 1, "fridgeTemp": 23.5, ... },
//!   "metadata": <repassado>,
//!   "kind": "telemetry-post" }
//! ```

use crate::decoder::decode;
use crate::input::normalize_payload;
use crate::types::{NodeKind, TelemetryRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Erros de decodificação. Todos são terminais para a mensagem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Tipo de payload não suportado: {0}")]
    UnsupportedPayloadType(&'static str),

    #[error("Nenhum payload encontrado na mensagem")]
    MissingPayload,

    #[error("Payload vazio")]
    EmptyPayload,

    #[error("Caractere hex inválido na posição {position}")]
    InvalidHex { position: usize },

    #[error("Payload curto demais para {node}: esperado {expected} bytes, recebido {actual}")]
    PayloadTooShort {
        node: NodeKind,
        expected: usize,
        actual: usize,
    },

    #[error("CRC inválido para {node}: recebido 0x{expected:02X}, calculado 0x{computed:02X}")]
    CrcMismatch {
        node: NodeKind,
        expected: u8,
        computed: u8,
    },

    #[error("ID de nó desconhecido: {0}")]
    UnknownNodeId(u8),

    #[error("Payload inválido da repetidora: {0} (faixas válidas 0–101 e 102–203)")]
    InvalidRepeaterPayload(u8),
}

/// Mensagem recebida do transporte.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Tem prioridade sobre `payload` quando presente.
    #[serde(default, rename = "payloadHex", skip_serializing_if = "Option::is_none")]
    pub payload_hex: Option<Value>,
    #[serde(default)]
    pub metadata: Value,
}

impl IngestMessage {
    /// Mensagem a partir de uma linha hex sem envelope JSON.
    pub fn from_hex(hex: &str) -> Self {
        Self {
            payload: Some(Value::String(hex.to_string())),
            ..Default::default()
        }
    }

    /// Interpreta um datagrama/linha: JSON se possível, senão hex puro.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<IngestMessage>(text) {
            Ok(msg) => msg,
            Err(_) => Self::from_hex(text.trim()),
        }
    }

    fn raw_payload(&self) -> Result<&Value, DecodeError> {
        self.payload_hex
            .as_ref()
            .or(self.payload.as_ref())
            .ok_or(DecodeError::UnsupportedPayloadType("undefined"))
    }
}

/// Tipo fixo da mensagem de saída.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "telemetry-post")]
    TelemetryPost,
}

/// Mensagem entregue ao armazenamento de telemetria.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub record: Map<String, Value>,
    pub metadata: Value,
    pub kind: MessageKind,
}

impl OutboundMessage {
    pub fn new(record: &TelemetryRecord, metadata: Value) -> Self {
        Self {
            record: record.to_fields(),
            metadata,
            kind: MessageKind::TelemetryPost,
        }
    }
}

/// Normaliza o payload, decodifica e monta a mensagem de saída.
pub fn decode_message(msg: IngestMessage) -> Result<OutboundMessage, DecodeError> {
    let bytes = normalize_payload(msg.raw_payload()?)?;
    let record = decode(&bytes)?;
    Ok(OutboundMessage::new(&record, msg.metadata))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
