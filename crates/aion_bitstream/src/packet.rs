//! The packet layer: Type-1/Type-2 configuration packets and NOOPs.
//!
//! This module understands only the packet header bit-fields. It has no idea
//! what a register *means* — that is [`crate::registers`]'s job.

use crate::error::{BitResult, BitstreamError};
use std::io::{Read, Write};

/// Packet header type field value for a Type-1 (short) packet.
pub const PACKET_TYPE_1: u16 = 1;
/// Packet header type field value for a Type-2 (long) packet.
pub const PACKET_TYPE_2: u16 = 2;

const TYPE_SHIFT: u16 = 13;
const OPCODE_SHIFT: u16 = 11;
const REG_SHIFT: u16 = 5;
const WORDCOUNT_MASK: u16 = 0x1F;
const REG_MASK: u16 = 0x3F;

/// The packet opcode (the 2-bit field following the type field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// No operation.
    Noop,
    /// Register read.
    Read,
    /// Register write.
    Write,
}

impl Opcode {
    fn from_bits(bits: u16) -> BitResult<Opcode> {
        match bits {
            0 => Ok(Opcode::Noop),
            1 => Ok(Opcode::Read),
            2 => Ok(Opcode::Write),
            other => Err(BitstreamError::BadPacket {
                offset: 0,
                reason: format!("reserved opcode {other}"),
            }),
        }
    }

    fn to_bits(self) -> u16 {
        match self {
            Opcode::Noop => 0,
            Opcode::Read => 1,
            Opcode::Write => 2,
        }
    }
}

/// A single decoded configuration packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A single NOOP word (`0x2000`).
    Noop,
    /// A Type-1 write: up to 31 16-bit words addressed to `reg`.
    T1Write {
        /// The 6-bit register index.
        reg: u16,
        /// The payload words, in file order.
        words: Vec<u16>,
    },
    /// A Type-1 read request for `word_count` words from `reg`.
    T1Read {
        /// The 6-bit register index.
        reg: u16,
        /// The number of words requested.
        word_count: u16,
    },
    /// A Type-2 write: `word_count` 16-bit words, always targeting FDRI.
    T2Write {
        /// Number of 16-bit words in the payload.
        word_count: u32,
        /// The payload words, in file order.
        words: Vec<u16>,
    },
}

/// Reads one packet from `r`, starting at the given byte `offset` (used only
/// for error reporting).
pub fn read_packet(r: &mut impl Read, offset: usize) -> BitResult<Packet> {
    let header = read_u16(r, offset)?;
    let ptype = header >> TYPE_SHIFT;
    let opcode_bits = (header >> OPCODE_SHIFT) & 0x3;

    match ptype {
        t if t == PACKET_TYPE_1 => {
            let opcode = Opcode::from_bits(opcode_bits).map_err(|_| BitstreamError::BadPacket {
                offset,
                reason: format!("reserved opcode {opcode_bits}"),
            })?;
            let reg = (header >> REG_SHIFT) & REG_MASK;
            let word_count = header & WORDCOUNT_MASK;

            match opcode {
                Opcode::Noop if reg == 0 && word_count == 0 => Ok(Packet::Noop),
                Opcode::Noop => Err(BitstreamError::BadPacket {
                    offset,
                    reason: "noop opcode with nonzero register/wordcount fields".to_string(),
                }),
                Opcode::Write => {
                    let mut words = Vec::with_capacity(word_count as usize);
                    for i in 0..word_count {
                        words.push(read_u16(r, offset + 2 + 2 * i as usize)?);
                    }
                    Ok(Packet::T1Write { reg, words })
                }
                Opcode::Read => Ok(Packet::T1Read { reg, word_count }),
            }
        }
        t if t == PACKET_TYPE_2 => {
            if header & 0x7FF != 0 {
                return Err(BitstreamError::BadPacket {
                    offset,
                    reason: "type-2 header has nonzero low 11 bits".to_string(),
                });
            }
            let opcode = Opcode::from_bits(opcode_bits).map_err(|_| BitstreamError::BadPacket {
                offset,
                reason: format!("reserved opcode {opcode_bits}"),
            })?;
            if opcode != Opcode::Write {
                return Err(BitstreamError::BadPacket {
                    offset,
                    reason: "type-2 packets must be writes (FDRI only)".to_string(),
                });
            }
            let word_count = read_u32(r, offset + 2)?;
            let mut words = Vec::with_capacity(word_count as usize);
            for i in 0..word_count {
                words.push(read_u16(r, offset + 6 + 2 * i as usize)?);
            }
            Ok(Packet::T2Write { word_count, words })
        }
        other => Err(BitstreamError::BadPacket {
            offset,
            reason: format!("bad packet type {other}"),
        }),
    }
}

/// Writes one packet to `w`.
pub fn write_packet(w: &mut impl Write, packet: &Packet) -> BitResult<()> {
    match packet {
        Packet::Noop => {
            write_u16(w, PACKET_TYPE_1 << TYPE_SHIFT)?;
        }
        Packet::T1Write { reg, words } => {
            let header = (PACKET_TYPE_1 << TYPE_SHIFT)
                | (Opcode::Write.to_bits() << OPCODE_SHIFT)
                | ((reg & REG_MASK) << REG_SHIFT)
                | (words.len() as u16 & WORDCOUNT_MASK);
            write_u16(w, header)?;
            for &word in words {
                write_u16(w, word)?;
            }
        }
        Packet::T1Read { reg, word_count } => {
            let header = (PACKET_TYPE_1 << TYPE_SHIFT)
                | (Opcode::Read.to_bits() << OPCODE_SHIFT)
                | ((reg & REG_MASK) << REG_SHIFT)
                | (word_count & WORDCOUNT_MASK);
            write_u16(w, header)?;
        }
        Packet::T2Write { word_count, words } => {
            let header = (PACKET_TYPE_2 << TYPE_SHIFT) | (Opcode::Write.to_bits() << OPCODE_SHIFT);
            write_u16(w, header)?;
            write_u32(w, *word_count)?;
            for &word in words {
                write_u16(w, word)?;
            }
        }
    }
    Ok(())
}

fn read_u16(r: &mut impl Read, offset: usize) -> BitResult<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf).map_err(|e| io_to_short_read(e, offset, 2))?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32(r: &mut impl Read, offset: usize) -> BitResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| io_to_short_read(e, offset, 4))?;
    Ok(u32::from_be_bytes(buf))
}

fn write_u16(w: &mut impl Write, v: u16) -> BitResult<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn write_u32(w: &mut impl Write, v: u32) -> BitResult<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn io_to_short_read(e: std::io::Error, offset: usize, expected: usize) -> BitstreamError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        BitstreamError::ShortRead { offset, expected }
    } else {
        BitstreamError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(packet: Packet) -> Packet {
        let mut buf = Vec::new();
        write_packet(&mut buf, &packet).unwrap();
        read_packet(&mut Cursor::new(buf), 0).unwrap()
    }

    #[test]
    fn noop_round_trip() {
        assert_eq!(round_trip(Packet::Noop), Packet::Noop);
    }

    #[test]
    fn noop_is_0x2000() {
        let mut buf = Vec::new();
        write_packet(&mut buf, &Packet::Noop).unwrap();
        assert_eq!(buf, vec![0x20, 0x00]);
    }

    #[test]
    fn t1_write_round_trip() {
        let packet = Packet::T1Write {
            reg: 4,
            words: vec![0x0001],
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn t1_write_empty_payload() {
        let packet = Packet::T1Write { reg: 4, words: vec![] };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn t1_read_round_trip() {
        let packet = Packet::T1Read { reg: 0, word_count: 1 };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn t2_write_round_trip() {
        let packet = Packet::T2Write {
            word_count: 3,
            words: vec![1, 2, 3],
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn t2_write_rejects_read_opcode() {
        // Manually construct a type-2 header with opcode=1 (read).
        let header: u16 = (PACKET_TYPE_2 << TYPE_SHIFT) | (1 << OPCODE_SHIFT);
        let mut buf = header.to_be_bytes().to_vec();
        buf.extend_from_slice(&0u32.to_be_bytes());
        let err = read_packet(&mut Cursor::new(buf), 0).unwrap_err();
        assert!(matches!(err, BitstreamError::BadPacket { .. }));
    }

    #[test]
    fn reserved_opcode_fails() {
        let header: u16 = (PACKET_TYPE_1 << TYPE_SHIFT) | (3 << OPCODE_SHIFT);
        let buf = header.to_be_bytes().to_vec();
        let err = read_packet(&mut Cursor::new(buf), 0).unwrap_err();
        assert!(matches!(err, BitstreamError::BadPacket { .. }));
    }

    #[test]
    fn bad_type_fails() {
        let header: u16 = 3 << TYPE_SHIFT;
        let buf = header.to_be_bytes().to_vec();
        let err = read_packet(&mut Cursor::new(buf), 0).unwrap_err();
        assert!(matches!(err, BitstreamError::BadPacket { .. }));
    }

    #[test]
    fn type2_nonzero_low_bits_fails() {
        let header: u16 = (PACKET_TYPE_2 << TYPE_SHIFT) | 1;
        let buf = header.to_be_bytes().to_vec();
        let err = read_packet(&mut Cursor::new(buf), 0).unwrap_err();
        assert!(matches!(err, BitstreamError::BadPacket { .. }));
    }

    #[test]
    fn short_read_mid_payload() {
        let header: u16 = (PACKET_TYPE_1 << TYPE_SHIFT) | (2 << OPCODE_SHIFT) | 2;
        let buf = header.to_be_bytes().to_vec();
        let err = read_packet(&mut Cursor::new(buf), 10).unwrap_err();
        assert!(matches!(err, BitstreamError::ShortRead { .. }));
    }
}
