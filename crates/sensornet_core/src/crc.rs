//! CRC-8 refletido usado pelos nós indoor e outdoor.
//!
//! Polinômio 0x31 refletido (constante de realimentação `0x8C`), valor
//! inicial `0x00`, processando o LSB primeiro. O resultado é comparado com o
//! byte de trailer do payload.

/// Constante de realimentação (0x31 refletido).
pub const CRC8_FEEDBACK: u8 = 0x8C;

/// Calcula o CRC-8 sobre `data`.
///
/// Os shifts são mascarados com `0x7F` como no firmware dos nós.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0x00;
    for &byte in data {
        let mut extract = byte;
        for _ in 0..8 {
            let sum = (crc ^ extract) & 0x01;
            crc = (crc >> 1) & 0x7F;
            if sum != 0 {
                crc ^= CRC8_FEEDBACK;
            }
            extract = (extract >> 1) & 0x7F;
        }
    }
    crc
}
