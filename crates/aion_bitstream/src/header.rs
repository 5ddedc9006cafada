//! The fixed ASCII preamble: magic bytes followed by four length-prefixed
//! header strings tagged 'a'..'d'.

use crate::error::{BitResult, BitstreamError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// The 13-byte magic prefix every bitstream must start with.
pub const MAGIC: [u8; 13] = [
    0x00, 0x09, 0x0F, 0xF0, 0x0F, 0xF0, 0x0F, 0xF0, 0x0F, 0xF0, 0x00, 0x00, 0x01,
];

/// Longest ASCII header string this format tolerates, including the NUL.
pub const MAX_HEADER_STR_LEN: usize = 128;

/// The decoded header: one string per code byte 'a'..'d', in that order.
///
/// Index 0 = tool/user tag, 1 = part name, 2 = date, 3 = time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// The four decoded strings, without their trailing NUL.
    pub strings: [String; 4],
}

impl Header {
    /// Reads the magic prefix and the four header strings from `r`.
    pub fn parse(r: &mut impl Read) -> BitResult<Header> {
        let mut magic = [0u8; 13];
        read_exact(r, &mut magic, 0)?;
        if magic != MAGIC {
            return Err(BitstreamError::BadMagic { offset: 0 });
        }

        let mut strings: [String; 4] = Default::default();
        let mut offset = MAGIC.len();
        for (i, code) in (b'a'..=b'd').enumerate() {
            let (s, consumed) = parse_header_string(r, code, offset)?;
            strings[i] = s;
            offset += consumed;
        }
        Ok(Header { strings })
    }

    /// Writes the magic prefix and the four header strings to `w`.
    pub fn write(&self, w: &mut impl Write) -> BitResult<()> {
        w.write_all(&MAGIC)?;
        for (code, s) in (b'a'..=b'd').zip(self.strings.iter()) {
            write_header_string(w, code, s)?;
        }
        Ok(())
    }
}

fn parse_header_string(r: &mut impl Read, code: u8, offset: usize) -> BitResult<(String, usize)> {
    let mut code_byte = [0u8; 1];
    read_exact(r, &mut code_byte, offset)?;
    if code_byte[0] != code {
        return Err(BitstreamError::BadHeader {
            code,
            offset,
            reason: format!("expected code byte '{}', found {:#04x}", code as char, code_byte[0]),
        });
    }

    let mut len_bytes = [0u8; 2];
    read_exact(r, &mut len_bytes, offset + 1)?;
    let len = u16::from_be_bytes(len_bytes) as usize;
    if len == 0 || len > MAX_HEADER_STR_LEN {
        return Err(BitstreamError::BadHeader {
            code,
            offset: offset + 1,
            reason: format!("string length {len} out of range (1..={MAX_HEADER_STR_LEN})"),
        });
    }

    let mut buf = vec![0u8; len];
    read_exact(r, &mut buf, offset + 3)?;
    if buf[len - 1] != 0 {
        return Err(BitstreamError::BadHeader {
            code,
            offset: offset + 3 + len - 1,
            reason: "string is not NUL-terminated".to_string(),
        });
    }
    let s = String::from_utf8_lossy(&buf[..len - 1]).into_owned();
    Ok((s, 1 + 2 + len))
}

fn write_header_string(w: &mut impl Write, code: u8, s: &str) -> BitResult<()> {
    let len = s.len() + 1;
    if len > MAX_HEADER_STR_LEN {
        return Err(BitstreamError::BadHeader {
            code,
            offset: 0,
            reason: format!("string length {len} exceeds {MAX_HEADER_STR_LEN}"),
        });
    }
    w.write_all(&[code])?;
    w.write_all(&(len as u16).to_be_bytes())?;
    w.write_all(s.as_bytes())?;
    w.write_all(&[0])?;
    Ok(())
}

fn read_exact(r: &mut impl Read, buf: &mut [u8], offset: usize) -> BitResult<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            BitstreamError::ShortRead {
                offset,
                expected: buf.len(),
            }
        } else {
            BitstreamError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> Header {
        Header {
            strings: [
                "fpgatools.fp;UserID=0xFFFFFFFF".to_string(),
                "6slx9tqg144".to_string(),
                "2010/05/26".to_string(),
                "08:00:00".to_string(),
            ],
        }
    }

    #[test]
    fn round_trip() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let parsed = Header::parse(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn bad_magic_fails() {
        let mut buf = vec![0xFFu8; 13];
        let err = Header::parse(&mut Cursor::new(buf.clone())).unwrap_err();
        assert!(matches!(err, BitstreamError::BadMagic { .. }));
        buf[0] = MAGIC[0];
        let err = Header::parse(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, BitstreamError::BadMagic { .. }));
    }

    #[test]
    fn wrong_code_byte_fails() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        buf[MAGIC.len()] = b'z';
        let err = Header::parse(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, BitstreamError::BadHeader { code: b'a', .. }));
    }

    #[test]
    fn non_nul_terminated_fails() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let last_a_byte = MAGIC.len() + 3 + header.strings[0].len();
        buf[last_a_byte] = b'x';
        let err = Header::parse(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, BitstreamError::BadHeader { code: b'a', .. }));
    }

    #[test]
    fn oversized_length_fails() {
        let header = Header {
            strings: ["x".repeat(200), "p".to_string(), "d".to_string(), "t".to_string()],
        };
        let mut buf = Vec::new();
        let err = header.write(&mut buf).unwrap_err();
        assert!(matches!(err, BitstreamError::BadHeader { .. }));
    }

    #[test]
    fn short_read_reports_offset() {
        let mut buf = MAGIC.to_vec();
        buf.push(b'a');
        let err = Header::parse(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, BitstreamError::ShortRead { .. }));
    }

    #[test]
    fn header_serde_round_trip() {
        let header = sample_header();
        let json = serde_json::to_string(&header).unwrap();
        let back: Header = serde_json::from_str(&json).unwrap();
        assert_eq!(back, header);
    }
}
