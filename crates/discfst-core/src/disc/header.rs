//! The disc header in sector 0.

use super::{DISC_MAGIC, DISC_MAGIC_OFFSET, DiscError};

const TITLE_OFFSET: usize = 0x20;
const TITLE_LEN: usize = 0x40;

/// Identity fields from the first 0x60 bytes of the disc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscHeader {
    /// The first eight bytes as one big-endian integer.
    pub disc_id: u64,
    /// Four-character game code, e.g. `RSBE`.
    pub game_code: String,
    /// Two-character maker code, e.g. `01`.
    pub maker_code: String,
    pub disc_number: u8,
    pub disc_version: u8,
    pub title: String,
}

impl DiscHeader {
    /// Parse a header from sector 0, rejecting anything without the Wii magic.
    pub fn parse(sector: &[u8]) -> Result<Self, DiscError> {
        if sector.len() < TITLE_OFFSET + TITLE_LEN {
            return Err(DiscError::BadMagic { found: [0; 4] });
        }

        let mut found = [0u8; 4];
        found.copy_from_slice(&sector[DISC_MAGIC_OFFSET..DISC_MAGIC_OFFSET + 4]);
        if found != DISC_MAGIC {
            return Err(DiscError::BadMagic { found });
        }

        let mut id = [0u8; 8];
        id.copy_from_slice(&sector[..8]);

        Ok(Self {
            disc_id: u64::from_be_bytes(id),
            game_code: ascii_field(&sector[..4]),
            maker_code: ascii_field(&sector[4..6]),
            disc_number: sector[6],
            disc_version: sector[7],
            title: ascii_field(&sector[TITLE_OFFSET..TITLE_OFFSET + TITLE_LEN]),
        })
    }
}

/// NUL-terminated, lossily decoded text field.
fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}
