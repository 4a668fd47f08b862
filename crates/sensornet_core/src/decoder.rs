//! Decodificador dos payloads binários dos nós.
//!
//! Formatos (todos os campos multi-byte em big-endian):
//!
//! ```text
//! Indoor (nó 1, 21 bytes)
//! ┌────┬──────┬───────┬───────┬─────┬────────┬────────┬────────┬────────┬────────┬──────┬────────┬─────┐
//! │ 0  │ 1    │ 2-3   │ 4-5   │ 6   │ 7-8    │ 9-10   │ 11-12  │ 13-15  │ 16-17  │ 18   │ 19     │ 20  │
//! │ id │ sign │ temp  │ hum   │ soc │ batSOC │ volt   │ curr   │ mAh    │ cycles │ docks│ status │ CRC │
//! └────┴──────┴───────┴───────┴─────┴────────┴────────┴────────┴────────┴────────┴──────┴────────┴─────┘
//!
//! Outdoor (nó 2, 14 bytes)
//! ┌────┬──────┬───────┬───────┬───────┬───────┬─────┬────────┬─────┬────────┐
//! │ 0  │ 1    │ 2-3   │ 4-5   │ 6-7   │ 8-9   │ 10  │ 11     │ 12  │ 13     │
//! │ id │ sign │ temp  │ hum   │ lux   │ wind  │ soc │ status │ CRC │ repSOC │
//! └────┴──────┴───────┴───────┴───────┴───────┴─────┴────────┴─────┴────────┘
//!
//! Repeater (1 byte): SOC codificado, ver [`RepeaterSoc`]
//! ```
//!
//! Cada chamada é independente: nenhum estado é mantido entre payloads.

use crate::crc::crc8;
use crate::protocol::DecodeError;
use crate::types::{
    DockState, HealthStatus, IndoorRecord, NodeKind, OutdoorRecord, RepeaterRecord,
    TelemetryRecord,
};
use tracing::trace;

/// Tamanho mínimo do payload indoor.
pub const INDOOR_PAYLOAD_LEN: usize = 21;
/// Tamanho mínimo do payload outdoor.
pub const OUTDOOR_PAYLOAD_LEN: usize = 14;

/// Posição do trailer CRC (= bytes cobertos pelo CRC).
const INDOOR_CRC_AT: usize = 20;
const OUTDOOR_CRC_AT: usize = 12;

/// Valor de SOC reservado para "bateria da repetidora com erro".
pub const SOC_ERROR_FLAG: u8 = 101;

/// Faixa do SOC da repetidora quando só o nó outdoor chegou até ela.
const OUTDOOR_ONLY_OFFSET: u8 = 102;
const OUTDOOR_ONLY_MAX: u8 = 203;

/// Decodifica um payload bruto em [`TelemetryRecord`].
///
/// O nó é escolhido pelo byte 0, exceto em payloads de 1 byte, que são
/// sempre da repetidora.
pub fn decode(bytes: &[u8]) -> Result<TelemetryRecord, DecodeError> {
    let first = *bytes.first().ok_or(DecodeError::EmptyPayload)?;
    let selector = if bytes.len() == 1 {
        NodeKind::Repeater.selector()
    } else {
        first
    };

    let node = NodeKind::from_selector(selector).ok_or(DecodeError::UnknownNodeId(selector))?;
    trace!("Decodificando {} bytes do nó {node}", bytes.len());

    match node {
        NodeKind::Indoor => decode_indoor(bytes).map(TelemetryRecord::Indoor),
        NodeKind::Outdoor => decode_outdoor(bytes).map(TelemetryRecord::Outdoor),
        NodeKind::Repeater => decode_repeater(bytes[0]).map(TelemetryRecord::Repeater),
    }
}

// ──────────────────────────────────────────────
// Validação de frame
// ──────────────────────────────────────────────

/// Confere tamanho mínimo e CRC antes de qualquer campo ser lido.
fn check_frame(
    node: NodeKind,
    bytes: &[u8],
    min_len: usize,
    crc_at: usize,
) -> Result<(), DecodeError> {
    if bytes.len() < min_len {
        return Err(DecodeError::PayloadTooShort {
            node,
            expected: min_len,
            actual: bytes.len(),
        });
    }

    let computed = crc8(&bytes[..crc_at]);
    let received = bytes[crc_at];
    if computed != received {
        return Err(DecodeError::CrcMismatch {
            node,
            expected: received,
            computed,
        });
    }

    Ok(())
}

fn be16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be24(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([0, bytes[at], bytes[at + 1], bytes[at + 2]])
}

/// Ponto fixo ×10 com sinal separado. Zero nunca vira `-0.0`.
fn tenths(raw: u16, negative: bool) -> f64 {
    let value = f64::from(raw) / 10.0;
    if negative && raw != 0 { -value } else { value }
}

// ──────────────────────────────────────────────
// Indoor
// ──────────────────────────────────────────────

const SIGN_TEMP: u8 = 0x01;
const SIGN_CURRENT: u8 = 0x02;
const SIGN_CONSUMED: u8 = 0x04;

const INDOOR_DHT_ERROR: u8 = 0b1000;
const INDOOR_SHUNT_ERROR: u8 = 0b0100;
const INDOOR_BATTERY_ERROR: u8 = 0b0001;

fn decode_indoor(bytes: &[u8]) -> Result<IndoorRecord, DecodeError> {
    check_frame(NodeKind::Indoor, bytes, INDOOR_PAYLOAD_LEN, INDOOR_CRC_AT)?;

    let sign = bytes[1];
    let consumed = be24(bytes, 13) as i32;
    let status = bytes[19];

    Ok(IndoorRecord {
        fridge_temp: tenths(be16(bytes, 2), sign & SIGN_TEMP != 0),
        fridge_hum: tenths(be16(bytes, 4), false),
        node_battery_soc: bytes[6],
        main_battery_soc: tenths(be16(bytes, 7), false),
        main_battery_voltage: tenths(be16(bytes, 9), false),
        main_battery_current: tenths(be16(bytes, 11), sign & SIGN_CURRENT != 0),
        consumed_mah: if sign & SIGN_CONSUMED != 0 { -consumed } else { consumed },
        charge_cycles: be16(bytes, 16),
        ebike_docks: DockState::unpack(bytes[18]),
        dht_status: HealthStatus::from_error_bit(status, INDOOR_DHT_ERROR),
        battery_monitor_status: HealthStatus::from_error_bit(status, INDOOR_SHUNT_ERROR),
        node_battery_status: HealthStatus::from_error_bit(status, INDOOR_BATTERY_ERROR),
    })
}

// ──────────────────────────────────────────────
// Outdoor
// ──────────────────────────────────────────────

const OUTDOOR_DHT_ERROR: u8 = 0b1000;
const OUTDOOR_LIGHT_ERROR: u8 = 0b0100;
const OUTDOOR_WIND_ERROR: u8 = 0b0010;
const OUTDOOR_BATTERY_ERROR: u8 = 0b0001;

fn decode_outdoor(bytes: &[u8]) -> Result<OutdoorRecord, DecodeError> {
    check_frame(NodeKind::Outdoor, bytes, OUTDOOR_PAYLOAD_LEN, OUTDOOR_CRC_AT)?;

    let status = bytes[11];
    // Valores acima de 101 passam sem alteração: a faixa 102–203 que
    // sinalizaria ausência do nó indoor não está ativa no firmware.
    let relayed_soc = bytes[13];

    Ok(OutdoorRecord {
        temp: tenths(be16(bytes, 2), bytes[1] == 1),
        humidity: tenths(be16(bytes, 4), false),
        illuminance: be16(bytes, 6),
        wind_speed: tenths(be16(bytes, 8), false),
        node_battery_soc: bytes[10],
        dht_status: HealthStatus::from_error_bit(status, OUTDOOR_DHT_ERROR),
        light_status: HealthStatus::from_error_bit(status, OUTDOOR_LIGHT_ERROR),
        wind_status: HealthStatus::from_error_bit(status, OUTDOOR_WIND_ERROR),
        node_battery_status: HealthStatus::from_error_bit(status, OUTDOOR_BATTERY_ERROR),
        repeater_battery_soc: relayed_soc,
        repeater_battery_status: HealthStatus::from_ok(relayed_soc != SOC_ERROR_FLAG),
    })
}

// ──────────────────────────────────────────────
// Repeater
// ──────────────────────────────────────────────

/// SOC da repetidora com o estado dos nós sobreposto na faixa de valores.
///
/// | bruto    | SOC         | indoor | outdoor |
/// |----------|-------------|--------|---------|
/// | 0–101    | bruto       | Error  | Error   |
/// | 102–203  | bruto − 102 | Error  | OK      |
///
/// SOC 101 marca a própria bateria da repetidora como `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeaterSoc {
    pub soc: u8,
    pub repeater_ok: bool,
    pub indoor_ok: bool,
    pub outdoor_ok: bool,
}

impl RepeaterSoc {
    pub fn decode(raw: u8) -> Result<Self, DecodeError> {
        match raw {
            0..=SOC_ERROR_FLAG => Ok(Self {
                soc: raw,
                repeater_ok: raw != SOC_ERROR_FLAG,
                indoor_ok: false,
                outdoor_ok: false,
            }),
            OUTDOOR_ONLY_OFFSET..=OUTDOOR_ONLY_MAX => {
                let soc = raw - OUTDOOR_ONLY_OFFSET;
                Ok(Self {
                    soc,
                    repeater_ok: soc != SOC_ERROR_FLAG,
                    indoor_ok: false,
                    outdoor_ok: true,
                })
            }
            _ => Err(DecodeError::InvalidRepeaterPayload(raw)),
        }
    }
}

fn decode_repeater(raw: u8) -> Result<RepeaterRecord, DecodeError> {
    let state = RepeaterSoc::decode(raw)?;
    Ok(RepeaterRecord {
        battery_soc: state.soc,
        battery_status: HealthStatus::from_ok(state.repeater_ok),
        indoor_battery_status: HealthStatus::from_ok(state.indoor_ok),
        outdoor_battery_status: HealthStatus::from_ok(state.outdoor_ok),
    })
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Payload indoor válido: 23.5 °C, 61.0 %RH, bateria 87 %, ...
    fn indoor_payload() -> Vec<u8> {
        let mut bytes = vec![
            0x01, // nó
            0x00, // sinais
            0x00, 0xEB, // 23.5 °C
            0x02, 0x62, // 61.0 %RH
            87,   // SOC nó
            0x02, 0xFD, // 76.5 %
            0x00, 0x83, // 13.1 V
            0x00, 0x17, // 2.3 A
            0x01, 0x00, 0x2C, // 65580 mAh
            0x00, 0x2A, // 42 ciclos
            0b11_10_01_00,
            0b0000,
        ];
        bytes.push(crc8(&bytes));
        bytes
    }

    fn outdoor_payload(relayed_soc: u8) -> Vec<u8> {
        let mut bytes = vec![
            0x02, // nó
            0x01, // negativo
            0x00, 0x32, // -5.0 °C
            0x03, 0x20, // 80.0 %RH
            0x04, 0xB0, // 1200 lux
            0x00, 0x2D, // 4.5 m/s
            64,   // SOC nó
            0b0110,
        ];
        bytes.push(crc8(&bytes));
        bytes.push(relayed_soc);
        bytes
    }

    fn with_crc(mut bytes: Vec<u8>, crc_at: usize) -> Vec<u8> {
        bytes[crc_at] = crc8(&bytes[..crc_at]);
        bytes
    }

    fn indoor(bytes: &[u8]) -> IndoorRecord {
        match decode(bytes).unwrap() {
            TelemetryRecord::Indoor(r) => r,
            other => panic!("esperado indoor, veio {other:?}"),
        }
    }

    #[test]
    fn decodes_indoor_fields() {
        let r = indoor(&indoor_payload());
        assert_eq!(r.fridge_temp, 23.5);
        assert_eq!(r.fridge_hum, 61.0);
        assert_eq!(r.node_battery_soc, 87);
        assert_eq!(r.main_battery_soc, 76.5);
        assert_eq!(r.main_battery_voltage, 13.1);
        assert_eq!(r.main_battery_current, 2.3);
        assert_eq!(r.consumed_mah, 65580);
        assert_eq!(r.charge_cycles, 42);
        assert_eq!(
            r.ebike_docks,
            [
                DockState::NotDocked,
                DockState::Charging,
                DockState::Discharging,
                DockState::Error,
            ]
        );
        assert_eq!(r.dht_status, HealthStatus::Ok);
        assert_eq!(r.battery_monitor_status, HealthStatus::Ok);
        assert_eq!(r.node_battery_status, HealthStatus::Ok);
    }

    #[test]
    fn indoor_sign_bits_apply() {
        let mut bytes = indoor_payload();
        bytes[1] = SIGN_TEMP | SIGN_CURRENT | SIGN_CONSUMED;
        let r = indoor(&with_crc(bytes, INDOOR_CRC_AT));
        assert_eq!(r.fridge_temp, -23.5);
        assert_eq!(r.main_battery_current, -2.3);
        assert_eq!(r.consumed_mah, -65580);
        assert_eq!(r.fridge_hum, 61.0);
    }

    #[test]
    fn negative_zero_is_plain_zero() {
        let mut bytes = indoor_payload();
        bytes[1] = SIGN_TEMP;
        bytes[2] = 0;
        bytes[3] = 0;
        let r = indoor(&with_crc(bytes, INDOOR_CRC_AT));
        assert!(r.fridge_temp.is_sign_positive());
    }

    #[test]
    fn indoor_status_bits() {
        let mut bytes = indoor_payload();
        bytes[19] = 0b1101;
        let r = indoor(&with_crc(bytes, INDOOR_CRC_AT));
        assert_eq!(r.dht_status, HealthStatus::Error);
        assert_eq!(r.battery_monitor_status, HealthStatus::Error);
        assert_eq!(r.node_battery_status, HealthStatus::Error);

        let mut bytes = indoor_payload();
        bytes[19] = 0b0010;
        let r = indoor(&with_crc(bytes, INDOOR_CRC_AT));
        assert_eq!(r.dht_status, HealthStatus::Ok);
        assert_eq!(r.battery_monitor_status, HealthStatus::Ok);
        assert_eq!(r.node_battery_status, HealthStatus::Ok);
    }

    #[test]
    fn indoor_too_short() {
        let bytes = &indoor_payload()[..20];
        assert_eq!(
            decode(bytes),
            Err(DecodeError::PayloadTooShort {
                node: NodeKind::Indoor,
                expected: 21,
                actual: 20,
            })
        );
    }

    #[test]
    fn corrupting_any_covered_byte_fails_crc() {
        let good = indoor_payload();
        for i in 0..INDOOR_CRC_AT {
            let mut bytes = good.clone();
            bytes[i] ^= 0x10;
            if i == 0 {
                // 0x01 ^ 0x10 = 0x11: nó desconhecido antes do CRC
                assert_eq!(decode(&bytes), Err(DecodeError::UnknownNodeId(0x11)));
                continue;
            }
            match decode(&bytes) {
                Err(DecodeError::CrcMismatch { node, expected, computed }) => {
                    assert_eq!(node, NodeKind::Indoor);
                    assert_eq!(expected, good[INDOOR_CRC_AT]);
                    assert_ne!(expected, computed);
                }
                other => panic!("byte {i}: esperado CrcMismatch, veio {other:?}"),
            }
            assert!(decode(&with_crc(bytes, INDOOR_CRC_AT)).is_ok());
        }
    }

    #[test]
    fn extra_trailing_bytes_are_ignored() {
        let mut bytes = indoor_payload();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(indoor(&bytes).fridge_temp, 23.5);
    }

    #[test]
    fn decodes_outdoor_fields() {
        let r = match decode(&outdoor_payload(73)).unwrap() {
            TelemetryRecord::Outdoor(r) => r,
            other => panic!("esperado outdoor, veio {other:?}"),
        };
        assert_eq!(r.temp, -5.0);
        assert_eq!(r.humidity, 80.0);
        assert_eq!(r.illuminance, 1200);
        assert_eq!(r.wind_speed, 4.5);
        assert_eq!(r.node_battery_soc, 64);
        assert_eq!(r.dht_status, HealthStatus::Ok);
        assert_eq!(r.light_status, HealthStatus::Error);
        assert_eq!(r.wind_status, HealthStatus::Error);
        assert_eq!(r.node_battery_status, HealthStatus::Ok);
        assert_eq!(r.repeater_battery_soc, 73);
        assert_eq!(r.repeater_battery_status, HealthStatus::Ok);
    }

    #[test]
    fn outdoor_sign_only_negative_for_one() {
        let mut bytes = outdoor_payload(50);
        bytes[1] = 2;
        match decode(&with_crc(bytes, OUTDOOR_CRC_AT)).unwrap() {
            TelemetryRecord::Outdoor(r) => assert_eq!(r.temp, 5.0),
            other => panic!("esperado outdoor, veio {other:?}"),
        }
    }

    #[test]
    fn outdoor_relayed_error_flag() {
        match decode(&outdoor_payload(SOC_ERROR_FLAG)).unwrap() {
            TelemetryRecord::Outdoor(r) => {
                assert_eq!(r.repeater_battery_soc, 101);
                assert_eq!(r.repeater_battery_status, HealthStatus::Error);
            }
            other => panic!("esperado outdoor, veio {other:?}"),
        }
    }

    #[test]
    fn outdoor_relayed_soc_above_flag_passes_through() {
        // 150 cairia na faixa 102–203 da repetidora, mas aqui não é remapeado
        match decode(&outdoor_payload(150)).unwrap() {
            TelemetryRecord::Outdoor(r) => {
                assert_eq!(r.repeater_battery_soc, 150);
                assert_eq!(r.repeater_battery_status, HealthStatus::Ok);
            }
            other => panic!("esperado outdoor, veio {other:?}"),
        }
    }

    #[test]
    fn outdoor_too_short() {
        let bytes = &outdoor_payload(50)[..13];
        assert_eq!(
            decode(bytes),
            Err(DecodeError::PayloadTooShort {
                node: NodeKind::Outdoor,
                expected: 14,
                actual: 13,
            })
        );
    }

    #[test]
    fn outdoor_crc_mismatch_names_node() {
        let mut bytes = outdoor_payload(50);
        bytes[5] ^= 0x01;
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::CrcMismatch { node: NodeKind::Outdoor, .. })
        ));
    }

    #[test]
    fn single_byte_is_always_repeater() {
        match decode(&[50]).unwrap() {
            TelemetryRecord::Repeater(r) => assert_eq!(r.battery_soc, 50),
            other => panic!("esperado repeater, veio {other:?}"),
        }
    }

    #[test]
    fn repeater_soc_partition() {
        assert_eq!(
            RepeaterSoc::decode(101),
            Ok(RepeaterSoc { soc: 101, repeater_ok: false, indoor_ok: false, outdoor_ok: false })
        );
        assert_eq!(
            RepeaterSoc::decode(202),
            Ok(RepeaterSoc { soc: 100, repeater_ok: true, indoor_ok: false, outdoor_ok: true })
        );
        assert_eq!(
            RepeaterSoc::decode(203),
            Ok(RepeaterSoc { soc: 101, repeater_ok: false, indoor_ok: false, outdoor_ok: true })
        );
        assert_eq!(
            RepeaterSoc::decode(0),
            Ok(RepeaterSoc { soc: 0, repeater_ok: true, indoor_ok: false, outdoor_ok: false })
        );
        assert_eq!(RepeaterSoc::decode(204), Err(DecodeError::InvalidRepeaterPayload(204)));
    }

    #[test]
    fn repeater_record_statuses() {
        let record = decode(&[101]).unwrap();
        assert_eq!(
            record,
            TelemetryRecord::Repeater(RepeaterRecord {
                battery_soc: 101,
                battery_status: HealthStatus::Error,
                indoor_battery_status: HealthStatus::Error,
                outdoor_battery_status: HealthStatus::Error,
            })
        );

        let record = decode(&[202]).unwrap();
        assert_eq!(
            record,
            TelemetryRecord::Repeater(RepeaterRecord {
                battery_soc: 100,
                battery_status: HealthStatus::Ok,
                indoor_battery_status: HealthStatus::Error,
                outdoor_battery_status: HealthStatus::Ok,
            })
        );

        assert_eq!(decode(&[204]), Err(DecodeError::InvalidRepeaterPayload(204)));
    }

    #[test]
    fn multi_byte_repeater_uses_first_byte() {
        match decode(&[3, 0xFF]).unwrap() {
            TelemetryRecord::Repeater(r) => assert_eq!(r.battery_soc, 3),
            other => panic!("esperado repeater, veio {other:?}"),
        }
    }

    #[test]
    fn unknown_node_and_empty() {
        assert_eq!(decode(&[7, 0]), Err(DecodeError::UnknownNodeId(7)));
        assert_eq!(decode(&[]), Err(DecodeError::EmptyPayload));
    }
}
