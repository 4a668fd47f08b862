//! Tipos dos registros de telemetria decodificados.
//!
//! Um [`TelemetryRecord`] por payload, com uma variante por tipo de nó.
//! Os nomes de chave usados em [`TelemetryRecord::to_fields`] são as chaves
//! de série temporal do backend e não podem mudar.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ──────────────────────────────────────────────
// Nós
// ──────────────────────────────────────────────

/// Tipo de nó, identificado pelo primeiro byte do payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Indoor = 1,
    Outdoor = 2,
    Repeater = 3,
}

impl NodeKind {
    /// Seletor de nó (valor do byte 0 no payload).
    pub fn selector(self) -> u8 {
        self as u8
    }

    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            1 => Some(Self::Indoor),
            2 => Some(Self::Outdoor),
            3 => Some(Self::Repeater),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Indoor => "indoor",
            Self::Outdoor => "outdoor",
            Self::Repeater => "repeater",
        };
        write!(f, "{name} (nó {})", self.selector())
    }
}

// ──────────────────────────────────────────────
// Estados
// ──────────────────────────────────────────────

/// Estado de saúde de um sensor ou bateria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "OK")]
    Ok,
    Error,
}

impl HealthStatus {
    /// `Error` se o bit estiver setado.
    pub fn from_error_bit(bits: u8, mask: u8) -> Self {
        if bits & mask != 0 { Self::Error } else { Self::Ok }
    }

    pub fn from_ok(ok: bool) -> Self {
        if ok { Self::Ok } else { Self::Error }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "Error",
        }
    }
}

/// Estado de uma doca de e-bike (2 bits no payload indoor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DockState {
    #[serde(rename = "Not Docked")]
    NotDocked,
    Charging,
    Discharging,
    Error,
}

impl DockState {
    /// Mapeia o valor de 2 bits. Qualquer valor fora de 0–2 é `Error`.
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::NotDocked,
            1 => Self::Charging,
            2 => Self::Discharging,
            _ => Self::Error,
        }
    }

    /// Desempacota as quatro docas de um byte, dos bits baixos para os altos.
    pub fn unpack(packed: u8) -> [Self; 4] {
        [0u8, 2, 4, 6].map(|shift| Self::from_bits((packed >> shift) & 0x03))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDocked => "Not Docked",
            Self::Charging => "Charging",
            Self::Discharging => "Discharging",
            Self::Error => "Error",
        }
    }
}

// ──────────────────────────────────────────────
// Indoor
// ──────────────────────────────────────────────

/// Dados do nó indoor (geladeira, bateria estacionária, docas).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndoorRecord {
    /// Temperatura da geladeira (°C)
    pub fridge_temp: f64,
    /// Umidade da geladeira (%RH)
    pub fridge_hum: f64,
    /// SOC da bateria do próprio nó (0–100%)
    pub node_battery_soc: u8,
    /// SOC da bateria principal (%)
    pub main_battery_soc: f64,
    /// Tensão da bateria principal (V)
    pub main_battery_voltage: f64,
    /// Corrente da bateria principal (A), negativa = descarga
    pub main_battery_current: f64,
    /// Carga consumida (mAh)
    pub consumed_mah: i32,
    /// Ciclos de carga
    pub charge_cycles: u16,
    /// Docas de e-bike 1–4
    pub ebike_docks: [DockState; 4],
    /// Sensor de umidade/temperatura
    pub dht_status: HealthStatus,
    /// Monitor de bateria (SmartShunt)
    pub battery_monitor_status: HealthStatus,
    /// Bateria do nó indoor
    pub node_battery_status: HealthStatus,
}

// ──────────────────────────────────────────────
// Outdoor
// ──────────────────────────────────────────────

/// Dados do nó outdoor, mais o SOC da repetidora anexado por ela.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutdoorRecord {
    /// Temperatura externa (°C)
    pub temp: f64,
    /// Umidade externa (%RH)
    pub humidity: f64,
    /// Iluminância (lux)
    pub illuminance: u16,
    /// Velocidade do vento (m/s)
    pub wind_speed: f64,
    /// SOC da bateria do nó outdoor (0–100%)
    pub node_battery_soc: u8,
    pub dht_status: HealthStatus,
    pub light_status: HealthStatus,
    pub wind_status: HealthStatus,
    pub node_battery_status: HealthStatus,
    /// SOC da repetidora (repassado no byte 13)
    pub repeater_battery_soc: u8,
    pub repeater_battery_status: HealthStatus,
}

// ──────────────────────────────────────────────
// Repeater
// ──────────────────────────────────────────────

/// Dados enviados pela repetidora quando nenhum payload indoor chegou.
///
/// Os estados de bateria indoor/outdoor são inferidos, não medidos.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepeaterRecord {
    pub battery_soc: u8,
    pub battery_status: HealthStatus,
    pub indoor_battery_status: HealthStatus,
    pub outdoor_battery_status: HealthStatus,
}

// ──────────────────────────────────────────────
// Registro completo
// ──────────────────────────────────────────────

/// Registro decodificado de um payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TelemetryRecord {
    Indoor(IndoorRecord),
    Outdoor(OutdoorRecord),
    Repeater(RepeaterRecord),
}

impl TelemetryRecord {
    pub fn node(&self) -> NodeKind {
        match self {
            Self::Indoor(_) => NodeKind::Indoor,
            Self::Outdoor(_) => NodeKind::Outdoor,
            Self::Repeater(_) => NodeKind::Repeater,
        }
    }

    /// Mapa plano chave/valor com as chaves de série temporal do backend.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("node".into(), Value::from(self.node().selector()));

        match self {
            Self::Indoor(r) => {
                put(&mut fields, "fridgeTemp", r.fridge_temp);
                put(&mut fields, "fridgeHum", r.fridge_hum);
                put(&mut fields, "InNodeBatSOC", r.node_battery_soc);
                put(&mut fields, "mainBatSOC", r.main_battery_soc);
                put(&mut fields, "mainBatVoltage", r.main_battery_voltage);
                put(&mut fields, "mainBatCurrent", r.main_battery_current);
                put(&mut fields, "consumed_mAh", r.consumed_mah);
                put(&mut fields, "chargeCycles", r.charge_cycles);
                for (i, dock) in r.ebike_docks.iter().enumerate() {
                    fields.insert(format!("eBikeState{}", i + 1), dock.as_str().into());
                }
                put(&mut fields, "InDHTStatus", r.dht_status.as_str());
                put(&mut fields, "SmartShuntStatus", r.battery_monitor_status.as_str());
                put(&mut fields, "InNodeBatStatus", r.node_battery_status.as_str());
            }
            Self::Outdoor(r) => {
                put(&mut fields, "outTemp", r.temp);
                put(&mut fields, "outHum", r.humidity);
                put(&mut fields, "illuminance", r.illuminance);
                put(&mut fields, "windspeed", r.wind_speed);
                put(&mut fields, "OutNodeBatSOC", r.node_battery_soc);
                put(&mut fields, "OutDHTStatus", r.dht_status.as_str());
                put(&mut fields, "OutLightStatus", r.light_status.as_str());
                put(&mut fields, "OutWindStatus", r.wind_status.as_str());
                put(&mut fields, "outNodeBatStatus", r.node_battery_status.as_str());
                put(&mut fields, "repNodeBatSOC", r.repeater_battery_soc);
                put(&mut fields, "repNodeBatStatus", r.repeater_battery_status.as_str());
            }
            Self::Repeater(r) => {
                put(&mut fields, "repNodeBatSOC", r.battery_soc);
                put(&mut fields, "outNodeBatStatus", r.outdoor_battery_status.as_str());
                put(&mut fields, "InNodeBatStatus", r.indoor_battery_status.as_str());
                put(&mut fields, "repNodeBatStatus", r.battery_status.as_str());
            }
        }

        fields
    }
}

fn put(fields: &mut Map<String, Value>, key: &str, value: impl Into<Value>) {
    fields.insert(key.into(), value.into());
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_indoor() -> IndoorRecord {
        IndoorRecord {
            fridge_temp: 4.5,
            fridge_hum: 61.2,
            node_battery_soc: 88,
            main_battery_soc: 76.4,
            main_battery_voltage: 13.1,
            main_battery_current: -2.3,
            consumed_mah: -15000,
            charge_cycles: 42,
            ebike_docks: [
                DockState::Charging,
                DockState::NotDocked,
                DockState::Discharging,
                DockState::Error,
            ],
            dht_status: HealthStatus::Ok,
            battery_monitor_status: HealthStatus::Error,
            node_battery_status: HealthStatus::Ok,
        }
    }

    #[test]
    fn dock_states_unpack_low_to_high() {
        assert_eq!(
            DockState::unpack(0b11_10_01_00),
            [
                DockState::NotDocked,
                DockState::Charging,
                DockState::Discharging,
                DockState::Error,
            ]
        );
    }

    #[test]
    fn health_from_error_bit() {
        assert_eq!(HealthStatus::from_error_bit(0b1000, 0b1000), HealthStatus::Error);
        assert_eq!(HealthStatus::from_error_bit(0b0111, 0b1000), HealthStatus::Ok);
    }

    #[test]
    fn indoor_fields_use_backend_keys() {
        let fields = TelemetryRecord::Indoor(sample_indoor()).to_fields();
        assert_eq!(fields["node"], 1);
        assert_eq!(fields["fridgeTemp"], 4.5);
        assert_eq!(fields["consumed_mAh"], -15000);
        assert_eq!(fields["eBikeState1"], "Charging");
        assert_eq!(fields["eBikeState2"], "Not Docked");
        assert_eq!(fields["SmartShuntStatus"], "Error");
        assert_eq!(fields.len(), 16);
    }

    #[test]
    fn repeater_fields_only_carry_repeater_keys() {
        let record = TelemetryRecord::Repeater(RepeaterRecord {
            battery_soc: 55,
            battery_status: HealthStatus::Ok,
            indoor_battery_status: HealthStatus::Error,
            outdoor_battery_status: HealthStatus::Ok,
        });
        let fields = record.to_fields();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields["node"], 3);
        assert_eq!(fields["InNodeBatStatus"], "Error");
        assert_eq!(fields["outNodeBatStatus"], "OK");
        assert!(!fields.contains_key("fridgeTemp"));
    }

    #[test]
    fn status_serializes_as_backend_strings() {
        assert_eq!(serde_json::to_value(HealthStatus::Ok).unwrap(), "OK");
        assert_eq!(serde_json::to_value(DockState::NotDocked).unwrap(), "Not Docked");
    }
}
