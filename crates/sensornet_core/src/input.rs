//! Normalização da entrada: string hex, array de bytes ou número → bytes.

use crate::protocol::DecodeError;
use serde_json::Value;

/// Converte o campo de payload de uma mensagem de ingestão em bytes.
///
/// - string: hex (com ou sem espaços)
/// - array: cada inteiro vira dois dígitos hex (byte baixo)
/// - número: forma decimal, interpretada como hex
pub fn normalize_payload(raw: &Value) -> Result<Vec<u8>, DecodeError> {
    let hex_text = match raw {
        Value::String(text) => text.clone(),
        Value::Array(items) => render_byte_array(items)?,
        Value::Number(n) => n.to_string(),
        other => return Err(DecodeError::UnsupportedPayloadType(json_type_name(other))),
    };
    hex_to_bytes(&hex_text)
}

/// Decodifica hex de dois em dois caracteres.
///
/// Espaços são removidos e um caractere final ímpar é descartado. A posição
/// em [`DecodeError::InvalidHex`] é o offset (em bytes) no texto recebido.
pub fn hex_to_bytes(text: &str) -> Result<Vec<u8>, DecodeError> {
    let digits: Vec<(usize, char)> = text
        .char_indices()
        .filter(|(_, c)| !c.is_whitespace())
        .collect();
    if digits.is_empty() {
        return Err(DecodeError::MissingPayload);
    }

    let usable = &digits[..digits.len() - digits.len() % 2];
    if let Some(&(position, _)) = usable.iter().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidHex { position });
    }

    let even: String = usable.iter().map(|&(_, c)| c).collect();
    let bytes = hex::decode(&even).map_err(|_| DecodeError::InvalidHex { position: 0 })?;

    if bytes.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    Ok(bytes)
}

fn render_byte_array(items: &[Value]) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(items.len() * 2);
    for item in items {
        let value = item
            .as_u64()
            .ok_or(DecodeError::UnsupportedPayloadType("array com elemento não inteiro"))?;
        out.push_str(&format!("{:02x}", value & 0xFF));
    }
    Ok(out)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
