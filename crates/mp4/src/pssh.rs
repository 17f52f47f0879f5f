//! Widevine PSSH (Protection System Specific Header) parsing.
//!
//! A `pssh` box carries DRM system init data. This follows the exact TLV
//! grammar used to recover key IDs from a Widevine `pssh`: version 0 is a
//! stream of one-byte field tags (some followed by a length-prefixed blob,
//! some by a 7-bit-continuation varint), version 1 is a flat
//! `kid_count` + `16 * kid_count` array of raw key IDs.

use thiserror::Error;
use tracing::warn;

pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PsshParseError {
    #[error("pssh buffer too short")]
    TooShort,
    #[error("box type is not 'pssh'")]
    NotPsshBox,
    #[error("system ID is not the Widevine system ID")]
    NotWidevine,
    #[error("unsupported pssh version {0}")]
    UnsupportedVersion(u8),
}

/// Key IDs and init data recovered from a Widevine `pssh` box.
#[derive(Debug, Clone, Default)]
pub struct WidevinePssh {
    /// The full box, as handed to the OCDM/DRM session as init data.
    pub init_data: Vec<u8>,
    /// Key IDs in the order they appeared in the box.
    pub key_ids: Vec<Vec<u8>>,
    /// `0x48` field, version 0 only.
    pub protection_scheme: Option<u32>,
    /// -1 until `set_default_key_id` finds a match, mirroring the
    /// originating helper's uninitialized slot.
    default_key_slot: i32,
}

impl WidevinePssh {
    pub fn parse(data: &[u8]) -> Result<Self, PsshParseError> {
        if data.len() < 8 {
            return Err(PsshParseError::TooShort);
        }
        let mut pos = 0usize;
        let box_size = read_u32(data, &mut pos).ok_or(PsshParseError::TooShort)?;
        if box_size as usize != data.len() {
            warn!(box_size, actual = data.len(), "pssh box size does not match buffer length");
        }
        if &data[4..8] != b"pssh" {
            return Err(PsshParseError::NotPsshBox);
        }
        pos = 8;
        let version_and_flags = read_u32(data, &mut pos).ok_or(PsshParseError::TooShort)?;
        let version = (version_and_flags >> 24) as u8;

        let system_id = data.get(pos..pos + 16).ok_or(PsshParseError::TooShort)?;
        if system_id != WIDEVINE_SYSTEM_ID {
            return Err(PsshParseError::NotWidevine);
        }
        pos += 16;

        let mut out = Self {
            init_data: data.to_vec(),
            key_ids: Vec::new(),
            protection_scheme: None,
            default_key_slot: -1,
        };

        match version {
            0 => out.parse_v0(data, pos)?,
            1 => out.parse_v1(data, &mut pos)?,
            other => return Err(PsshParseError::UnsupportedVersion(other)),
        }
        Ok(out)
    }

    fn parse_v0(&mut self, data: &[u8], mut pos: usize) -> Result<(), PsshParseError> {
        let data_size = read_u32(data, &mut pos).ok_or(PsshParseError::TooShort)?;
        let remaining = data.len().saturating_sub(pos);
        if data_size as usize != remaining {
            warn!(data_size, remaining, "pssh data size field does not match remaining bytes");
        }

        while pos < data.len() {
            let field_type = data[pos];
            pos += 1;
            match field_type {
                // Deprecated scalar fields, still parsed so the rest of the
                // TLV stream stays in sync.
                0x38 | 0x50 | 0x08 => {
                    parse_multi_int(data, &mut pos);
                }
                0x48 => {
                    self.protection_scheme = Some(parse_multi_int(data, &mut pos) as u32);
                }
                // Content ID and Key ID share layout: a single length byte
                // followed by that many raw bytes. Some streams carry a
                // content ID with no key IDs at all.
                0x22 | 0x12 => {
                    let Some(&field_size) = data.get(pos) else {
                        break;
                    };
                    pos += 1;
                    let field_size = field_size as usize;
                    if field_size > 0 && pos + field_size <= data.len() {
                        self.key_ids.push(data[pos..pos + field_size].to_vec());
                    }
                    pos += field_size;
                }
                // Deprecated length-prefixed string fields.
                0x32 | 0x2a | 0x1a => {
                    let Some(&field_size) = data.get(pos) else {
                        break;
                    };
                    pos += 1;
                    pos += field_size as usize;
                }
                _ => {
                    // Unknown tag: there is no generic way to know its
                    // length, so (matching the original parser) we stop
                    // advancing extra bytes for it and simply continue the
                    // loop at the next byte. A pssh using an unrecognized
                    // tag with a length-prefixed payload will desync from
                    // here on, same as the source this was ported from.
                }
            }
        }
        Ok(())
    }

    fn parse_v1(&mut self, data: &[u8], pos: &mut usize) -> Result<(), PsshParseError> {
        let kid_count = read_u32(data, pos).ok_or(PsshParseError::TooShort)?;
        for _ in 0..kid_count {
            let kid = data.get(*pos..*pos + 16).ok_or(PsshParseError::TooShort)?;
            self.key_ids.push(kid.to_vec());
            *pos += 16;
        }
        Ok(())
    }

    /// Select the key ID matching `key_id` as the default slot returned by
    /// `get_key`. No-op if nothing matches.
    pub fn set_default_key_id(&mut self, key_id: &[u8]) {
        for (slot, existing) in self.key_ids.iter().enumerate() {
            if existing.as_slice() == key_id {
                self.default_key_slot = slot as i32;
            }
        }
    }

    /// The default key ID: the one selected via `set_default_key_id` if
    /// valid, otherwise the first key ID, matching the fallback the
    /// Widevine helper used when no default was ever set.
    pub fn get_key(&self) -> Option<&[u8]> {
        if self.default_key_slot >= 0 && (self.default_key_slot as usize) < self.key_ids.len() {
            Some(&self.key_ids[self.default_key_slot as usize])
        } else {
            self.key_ids.first().map(Vec::as_slice)
        }
    }
}

fn read_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
    let slice = data.get(*pos..*pos + 4)?;
    *pos += 4;
    Some(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn parse_multi_int(data: &[u8], pos: &mut usize) -> i64 {
    let mut value: i64 = 0;
    let mut shift = 0;
    while *pos < data.len() {
        let code = data[*pos];
        *pos += 1;
        value |= ((code & 0x7f) as i64) << shift;
        if code & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_v0_pssh(fields: &[u8], key_ids: &[&[u8]]) -> Vec<u8> {
        let mut data_section = Vec::new();
        data_section.extend_from_slice(fields);
        for kid in key_ids {
            data_section.push(0x12);
            data_section.push(kid.len() as u8);
            data_section.extend_from_slice(kid);
        }

        let mut body = Vec::new();
        body.extend_from_slice(&WIDEVINE_SYSTEM_ID);
        body.extend_from_slice(&(data_section.len() as u32).to_be_bytes());
        body.extend_from_slice(&data_section);

        let mut out = Vec::new();
        let total = 8 + 4 + body.len();
        out.extend_from_slice(&(total as u32).to_be_bytes());
        out.extend_from_slice(b"pssh");
        out.extend_from_slice(&0u32.to_be_bytes()); // version 0, no flags
        out.extend_from_slice(&body);
        out
    }

    fn make_v1_pssh(key_ids: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&WIDEVINE_SYSTEM_ID);
        body.extend_from_slice(&(key_ids.len() as u32).to_be_bytes());
        for kid in key_ids {
            body.extend_from_slice(kid);
        }

        let mut out = Vec::new();
        let total = 8 + 4 + body.len();
        out.extend_from_slice(&(total as u32).to_be_bytes());
        out.extend_from_slice(b"pssh");
        out.extend_from_slice(&(1u32 << 24).to_be_bytes()); // version 1
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn parses_v0_single_key_id() {
        let kid = [0xaa; 16];
        let pssh = make_v0_pssh(&[], &[&kid]);
        let parsed = WidevinePssh::parse(&pssh).unwrap();
        assert_eq!(parsed.key_ids, vec![kid.to_vec()]);
        assert_eq!(parsed.get_key(), Some(kid.as_slice()));
    }

    #[test]
    fn parses_v0_multiple_key_ids_and_protection_scheme() {
        // 0x48 protection scheme, single-byte varint value 1 (cenc).
        let pssh = make_v0_pssh(&[0x48, 0x01], &[&[0x11; 16], &[0x22; 16]]);
        let parsed = WidevinePssh::parse(&pssh).unwrap();
        assert_eq!(parsed.key_ids.len(), 2);
        assert_eq!(parsed.protection_scheme, Some(1));
    }

    #[test]
    fn parses_v0_ignores_deprecated_fields() {
        let pssh = make_v0_pssh(&[0x38, 0x05, 0x50, 0x02, 0x08, 0x01], &[&[0x33; 16]]);
        let parsed = WidevinePssh::parse(&pssh).unwrap();
        assert_eq!(parsed.key_ids, vec![vec![0x33; 16]]);
    }

    #[test]
    fn parses_v1_key_id_array() {
        let kids: [&[u8]; 2] = [&[0x01; 16], &[0x02; 16]];
        let pssh = make_v1_pssh(&kids);
        let parsed = WidevinePssh::parse(&pssh).unwrap();
        assert_eq!(parsed.key_ids.len(), 2);
        assert_eq!(parsed.key_ids[0], vec![0x01; 16]);
        assert_eq!(parsed.key_ids[1], vec![0x02; 16]);
    }

    #[test]
    fn rejects_non_widevine_system_id() {
        let mut pssh = make_v1_pssh(&[&[0xaa; 16]]);
        pssh[12] = 0x00; // corrupt a system ID byte
        assert_eq!(WidevinePssh::parse(&pssh), Err(PsshParseError::NotWidevine));
    }

    #[test]
    fn rejects_non_pssh_box_type() {
        let mut pssh = make_v1_pssh(&[&[0xaa; 16]]);
        pssh[4..8].copy_from_slice(b"moov");
        assert_eq!(WidevinePssh::parse(&pssh), Err(PsshParseError::NotPsshBox));
    }

    #[test]
    fn get_key_falls_back_to_first_when_default_unset() {
        let kids: [&[u8]; 2] = [&[0x01; 16], &[0x02; 16]];
        let parsed = WidevinePssh::parse(&make_v1_pssh(&kids)).unwrap();
        assert_eq!(parsed.get_key(), Some([0x01; 16].as_slice()));
    }

    #[test]
    fn set_default_key_id_selects_matching_slot() {
        let kids: [&[u8]; 2] = [&[0x01; 16], &[0x02; 16]];
        let mut parsed = WidevinePssh::parse(&make_v1_pssh(&kids)).unwrap();
        parsed.set_default_key_id(&[0x02; 16]);
        assert_eq!(parsed.get_key(), Some([0x02; 16].as_slice()));
    }

    #[test]
    fn set_default_key_id_no_match_keeps_fallback() {
        let kids: [&[u8]; 2] = [&[0x01; 16], &[0x02; 16]];
        let mut parsed = WidevinePssh::parse(&make_v1_pssh(&kids)).unwrap();
        parsed.set_default_key_id(&[0xff; 16]);
        assert_eq!(parsed.get_key(), Some([0x01; 16].as_slice()));
    }
}
