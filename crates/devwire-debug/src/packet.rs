use std::fmt;

use crate::error::{DebugError, Result};

/// Character codes at or above this value cannot be checksummed.
const FIRST_INVALID_CODE: u32 = 0xD800;

/// Checksum of a packet payload: the sum of its character codes, mod 256.
///
/// Every character must be a single code unit below `0xD800`; characters
/// outside the Basic Multilingual Plane and the whole `0xD800..=0xFFFF`
/// range are rejected before anything is summed.
pub fn checksum(payload: &str) -> Result<u8> {
    sum_codes(payload.chars().map(u32::from))
}

/// [`checksum`] over UTF-16 code units, where lone surrogates can occur.
pub fn checksum_utf16(units: &[u16]) -> Result<u8> {
    sum_codes(units.iter().map(|&unit| u32::from(unit)))
}

fn sum_codes(codes: impl Iterator<Item = u32> + Clone) -> Result<u8> {
    if let Some((position, code)) = codes
        .clone()
        .enumerate()
        .find(|&(_, code)| code >= FIRST_INVALID_CODE)
    {
        return Err(DebugError::InvalidCharacter { position, code });
    }
    Ok(codes.fold(0u8, |sum, code| sum.wrapping_add(code as u8)))
}

/// A framed debug packet: `$<payload>#<cc>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: String,
    checksum: u8,
}

impl Packet {
    pub fn new(payload: impl Into<String>) -> Result<Self> {
        let payload = payload.into();
        let checksum = checksum(&payload)?;
        Ok(Self { payload, checksum })
    }

    /// Build a packet from UTF-16 code units.
    pub fn from_utf16(units: &[u16]) -> Result<Self> {
        let checksum = checksum_utf16(units)?;
        // Validated: every unit is below the surrogate range.
        let payload = String::from_utf16_lossy(units);
        Ok(Self { payload, checksum })
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Wire bytes of the framed packet.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}#{:02x}", self.payload, self.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_no_ack_mode_checksum() {
        assert_eq!(checksum("QStartNoAckMode").unwrap(), 0xb0);
        assert_eq!(
            Packet::new("QStartNoAckMode").unwrap().to_string(),
            "$QStartNoAckMode#b0"
        );
    }

    #[test]
    fn checksum_wraps_and_prints_two_lowercase_digits() {
        assert_eq!(Packet::new("").unwrap().to_string(), "$#00");
        // 'D' = 0x44
        assert_eq!(Packet::new("D").unwrap().to_string(), "$D#44");
        // 'O' + 'K' = 0x9a
        assert_eq!(Packet::new("OK").unwrap().to_string(), "$OK#9a");
        // 0xFF + 0x02 wraps to 0x01
        assert_eq!(Packet::new("\u{FF}\u{02}").unwrap().checksum(), 0x01);
    }

    #[test]
    fn utf16_matches_str() {
        let text = "vCont;c";
        let units: Vec<u16> = text.encode_utf16().collect();
        assert_eq!(Packet::from_utf16(&units).unwrap(), Packet::new(text).unwrap());
    }

    #[test]
    fn lone_surrogate_rejected() {
        let units = [b'A' as u16, 0xD800, b'B' as u16];
        let err = Packet::from_utf16(&units).unwrap_err();
        assert!(matches!(
            err,
            DebugError::InvalidCharacter { position: 1, code: 0xD800 }
        ));
    }

    #[test]
    fn high_bmp_and_astral_rejected() {
        assert!(matches!(
            checksum("a\u{E000}"),
            Err(DebugError::InvalidCharacter { position: 1, code: 0xE000 })
        ));
        assert!(matches!(
            checksum("\u{1F600}"),
            Err(DebugError::InvalidCharacter { position: 0, code: 0x1F600 })
        ));
        assert!(checksum("\u{D7FF}").is_ok());
    }
}
