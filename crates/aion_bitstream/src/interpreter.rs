//! The register-level state machine: maps the packet stream onto named
//! configuration registers and drives the frame store through FAR_MAJ/FDRI.
//!
//! This is a single-pass design: every packet is classified exactly once
//! against the current state (`Prologue` / `FdriPayload` / `Epilogue`),
//! rather than scanning the stream once to locate register actions and
//! again to extract the FDRI payload. The tradeoff is that FAR/FDRI-length
//! bookkeeping has to be tracked incrementally as packets arrive.

use crate::config::Config;
use crate::error::{BitResult, BitstreamError};
use crate::frame_store::{self, FrameBuffer};
use crate::header::Header;
use crate::model::DeviceVariant;
use crate::packet::{self, Packet};
use crate::registers::{self, Cmd, ConfigLog, RegAction, RegValue, Register};
use std::io::{Read, Seek, SeekFrom, Write};

const STREAM_CODE: u8 = b'e';
const FILLER_LEN: usize = 16;
const FILLER_BYTE: u8 = 0xFF;
const SYNC_WORD: u32 = 0xAA99_5566;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Prologue,
    FdriPayload,
    Epilogue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FarState {
    row: u16,
    major: u16,
    minor: u16,
}

/// The result of a successful [`read_bitfile`] call.
#[derive(Debug, Clone)]
pub struct BitfileParts {
    /// The decoded ASCII header.
    pub header: Header,
    /// The decoded configuration: frame memory plus the register action log.
    pub config: Config,
}

/// Parses a complete bitstream file from `r`.
///
/// `minors_per_major` is the target device's per-major-column minor-frame
/// count (device geometry, supplied by the caller's `Model`); it must sum to
/// `FRAMES_PER_ROW` real frames per row.
pub fn read_bitfile(r: &mut impl Read, minors_per_major: &[u16]) -> BitResult<BitfileParts> {
    let header = Header::parse(r)?;

    let mut code = [0u8; 1];
    read_exact(r, &mut code, "stream code byte")?;
    if code[0] != STREAM_CODE {
        return Err(BitstreamError::BadPacket {
            offset: 0,
            reason: format!("expected stream code 'e', found {:#04x}", code[0]),
        });
    }

    let mut len_bytes = [0u8; 4];
    read_exact(r, &mut len_bytes, "payload length")?;
    let payload_len = u32::from_be_bytes(len_bytes) as usize;

    let mut payload = vec![0u8; payload_len];
    r.read_exact(&mut payload).map_err(|e| io_to_short_read(e, payload_len))?;
    let mut cursor = std::io::Cursor::new(payload);

    let mut filler = [0u8; FILLER_LEN];
    read_exact(&mut cursor, &mut filler, "filler bytes")?;

    let mut sync = [0u8; 4];
    read_exact(&mut cursor, &mut sync, "sync word")?;
    if u32::from_be_bytes(sync) != SYNC_WORD {
        return Err(BitstreamError::BadPacket {
            offset: 0,
            reason: "sync word mismatch".to_string(),
        });
    }

    let mut log = ConfigLog::new();
    let mut far = FarState::default();
    let mut mfw_source: Option<FarState> = None;
    let mut idcode: Option<u32> = None;
    let mut device: Option<DeviceVariant> = None;
    let mut frames: Option<FrameBuffer> = None;
    let mut auto_crc = registers::DEFAULT_AUTO_CRC;
    let mut state = State::Prologue;

    let end = payload_len as u64 - cursor.position();
    let stop_at = cursor.position() + end;
    while cursor.position() < stop_at {
        let offset = cursor.position() as usize;
        let packet = packet::read_packet(&mut cursor, offset)?;
        match packet {
            Packet::Noop => {
                log.push(RegAction::Noop)?;
            }
            Packet::T1Read { reg, word_count } => {
                let register = Register::from_code(reg).ok_or(BitstreamError::BadRegister { code: reg, offset })?;
                log.push(RegAction::Read { reg: register, word_count })?;
            }
            Packet::T1Write { reg, words } => {
                let register = Register::from_code(reg).ok_or(BitstreamError::BadRegister { code: reg, offset })?;
                let value = decode_value(register, &words);

                match register {
                    Register::FarMaj => {
                        if let RegValue::Far(row, major) = value {
                            far.row = row;
                            far.major = major;
                        }
                    }
                    Register::FarMin => {
                        if let RegValue::Int(minor) = value {
                            far.minor = minor as u16;
                        }
                    }
                    Register::Idcode => {
                        if let RegValue::Int(v) = value {
                            idcode = Some(v);
                        }
                    }
                    Register::Flr => {
                        if let RegValue::Int(v) = value {
                            if v != registers::FLR_VALUE {
                                return Err(BitstreamError::BadPacket {
                                    offset,
                                    reason: format!("FLR write carries {v}, expected {}", registers::FLR_VALUE),
                                });
                            }
                        }
                    }
                    Register::Cmd => {
                        if let RegValue::Int(v) = value {
                            let cmd = Cmd::from_raw(v).ok_or(BitstreamError::BadRegister { code: reg, offset })?;
                            match cmd {
                                Cmd::Wcfg if state == State::Prologue => {
                                    let idc = idcode.ok_or(BitstreamError::InternalInvariant {
                                        detail: "WCFG issued before IDCODE was written".to_string(),
                                    })?;
                                    let variant = DeviceVariant::from_idcode(idc)
                                        .ok_or(BitstreamError::UnsupportedDevice { idcode: idc })?;
                                    if far != FarState::default() {
                                        return Err(BitstreamError::BadFar {
                                            row: far.row,
                                            major: far.major,
                                            minor: far.minor,
                                            offset,
                                        });
                                    }
                                    frames = Some(FrameBuffer::new(minors_per_major.to_vec()));
                                    device = Some(variant);
                                    log.mark_bits_boundary();
                                    state = State::FdriPayload;
                                }
                                Cmd::Mfw => {
                                    mfw_source = Some(far);
                                }
                                Cmd::Grestore | Cmd::Lfrm if state == State::FdriPayload => {
                                    state = State::Epilogue;
                                }
                                _ => {}
                            }
                        }
                    }
                    Register::Mfwr => {
                        if words.len() == 4 && words.iter().all(|&w| w == 0) {
                            if let Some(src) = mfw_source {
                                let fb = frames.as_mut().ok_or(BitstreamError::InternalInvariant {
                                    detail: "MFWR seen before frame buffer allocated".to_string(),
                                })?;
                                fb.copy_frame(src.row, src.major, src.minor, far.row, far.major, far.minor)?;
                            }
                        }
                    }
                    _ => {}
                }

                log.push(RegAction::Write { reg: register, value })?;
            }
            Packet::T2Write { word_count, words } => {
                let fb = frames.as_mut().ok_or(BitstreamError::InternalInvariant {
                    detail: "Type-2 FDRI payload seen before WCFG".to_string(),
                })?;
                auto_crc = consume_fdri_payload(fb, minors_per_major, &words)?;
                log.push(RegAction::Write {
                    reg: Register::Fdri,
                    value: RegValue::Int(word_count),
                })?;
            }
        }
    }

    let device = device.ok_or(BitstreamError::InternalInvariant {
        detail: "bitstream never reached CMD_WCFG".to_string(),
    })?;
    let frames = frames.ok_or(BitstreamError::InternalInvariant {
        detail: "frame buffer was never allocated".to_string(),
    })?;
    if !log.has_required_prologue() {
        return Err(BitstreamError::InternalInvariant {
            detail: "IDCODE or FLR write missing from prologue".to_string(),
        });
    }

    Ok(BitfileParts {
        header,
        config: Config { device, frames, log, auto_crc },
    })
}

/// Emits a complete bitstream file to `w`, following the fixed prologue and
/// epilogue script documented for this device family.
pub fn write_bitfile(w: &mut (impl Write + Seek), header: &Header, config: &Config) -> BitResult<()> {
    header.write(w)?;
    w.write_all(&[STREAM_CODE])?;
    let len_pos = w.stream_position()?;
    write_u32(w, 0)?;
    w.write_all(&[FILLER_BYTE; FILLER_LEN])?;
    write_u32(w, SYNC_WORD)?;

    emit_prologue(w, config)?;
    emit_fdri(w, config)?;
    emit_epilogue(w, config)?;

    let end = w.stream_position()?;
    let total_len = (end - len_pos - 4) as u32;
    w.seek(SeekFrom::Start(len_pos))?;
    write_u32(w, total_len)?;
    w.seek(SeekFrom::Start(end))?;
    Ok(())
}

fn emit_prologue(w: &mut impl Write, config: &Config) -> BitResult<()> {
    write_cmd(w, Cmd::Rcrc)?;
    write_noop(w)?;
    write_reg(w, Register::Flr, registers::FLR_VALUE)?;
    write_reg(w, Register::Cor1, registers::COR1_DEF | registers::COR1_CRC_BYPASS)?;
    write_reg(w, Register::Cor2, registers::COR2_DEF)?;
    write_reg(w, Register::Idcode, config.device.idcode())?;
    write_reg(w, Register::Mask, registers::MASK_DEF)?;
    write_reg(w, Register::Ctl, registers::CTL_DEF)?;
    for _ in 0..17 {
        write_noop(w)?;
    }
    write_reg(w, Register::CclkFreq, registers::CCLK_FREQ_DEF)?;
    write_reg(w, Register::PwrdnReg, registers::PWRDN_REG_DEF)?;
    write_reg(w, Register::EyeMask, registers::EYE_MASK_DEF)?;
    write_reg(w, Register::HcOptReg, registers::HC_OPT_REG_DEF)?;
    write_reg(w, Register::Cwdt, registers::CWDT_DEF)?;
    write_reg(w, Register::PuGwe, registers::PU_GWE_DEF)?;
    write_reg(w, Register::PuGts, registers::PU_GTS_DEF)?;
    write_reg(w, Register::ModeReg, registers::MODE_REG_DEF)?;
    for reg in [Register::General1, Register::General2, Register::General3, Register::General4, Register::General5] {
        write_reg(w, reg, registers::GENERAL_DEF)?;
    }
    write_reg(w, Register::SeuOpt, registers::SEU_OPT_DEF)?;
    write_reg(w, Register::ExpSign, registers::EXP_SIGN_DEF)?;
    for _ in 0..2 {
        write_noop(w)?;
    }
    write_far_maj(w, 0, 0)?;
    write_cmd(w, Cmd::Wcfg)?;
    Ok(())
}

fn emit_epilogue(w: &mut impl Write, config: &Config) -> BitResult<()> {
    for _ in 0..24 {
        write_noop(w)?;
    }
    write_cmd(w, Cmd::Grestore)?;
    write_cmd(w, Cmd::Lfrm)?;
    for _ in 0..4 {
        write_noop(w)?;
    }
    write_cmd(w, Cmd::Grestore)?;
    write_cmd(w, Cmd::Start)?;
    write_reg(w, Register::Mask, registers::MASK_DEF | registers::MASK_SECURITY)?;
    write_reg(w, Register::Ctl, registers::CTL_DEF)?;
    write_reg(w, Register::Crc, config.auto_crc)?;
    write_cmd(w, Cmd::Desync)?;
    for _ in 0..14 {
        write_noop(w)?;
    }
    Ok(())
}

fn emit_fdri(w: &mut impl Write, config: &Config) -> BitResult<()> {
    let minors_per_major = config.frames.minors_per_major().to_vec();
    let mut bytes = Vec::new();

    for row in 0..frame_store::NUM_ROWS as u16 {
        for (major, &minors) in minors_per_major.iter().enumerate() {
            for minor in 0..minors {
                bytes.extend_from_slice(&config.frames.read_frame(row, major as u16, minor)?);
            }
        }
        for _ in 0..frame_store::PADDING_FRAMES_PER_ROW {
            bytes.extend(std::iter::repeat(0xFFu8).take(frame_store::FRAME_SIZE));
        }
    }

    let buf = config.frames.as_bytes();
    bytes.extend_from_slice(&buf[frame_store::BRAM_DATA_START..frame_store::BRAM_DATA_START + frame_store::BRAM_DATA_LEN]);
    bytes.extend_from_slice(&buf[frame_store::IOB_DATA_START..frame_store::IOB_DATA_START + frame_store::IOB_DATA_LEN]);
    bytes.extend_from_slice(&config.auto_crc.to_be_bytes());

    if bytes.len() % 2 != 0 {
        return Err(BitstreamError::InternalInvariant {
            detail: "assembled FDRI payload has an odd byte length".to_string(),
        });
    }
    let words: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
    let word_count = words.len() as u32;
    packet::write_packet(w, &Packet::T2Write { word_count, words })
}

/// Takes `len` bytes starting at `pos`, failing with [`BitstreamError::ShortRead`]
/// rather than panicking when `bytes` does not have that many left. A
/// structurally valid packet (one whose `word_count` satisfies
/// `packet::read_packet`) says nothing about whether it carries enough words
/// for this device's geometry, so every slice this function takes must be
/// bounds-checked.
fn take(bytes: &[u8], pos: usize, len: usize) -> BitResult<&[u8]> {
    bytes.get(pos..pos + len).ok_or(BitstreamError::ShortRead {
        offset: pos,
        expected: len,
    })
}

fn consume_fdri_payload(frames: &mut FrameBuffer, minors_per_major: &[u16], words: &[u16]) -> BitResult<u32> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for &w in words {
        bytes.extend_from_slice(&w.to_be_bytes());
    }
    let mut pos = 0usize;

    for row in 0..frame_store::NUM_ROWS as u16 {
        for (major, &minors) in minors_per_major.iter().enumerate() {
            for minor in 0..minors {
                let frame = take(&bytes, pos, frame_store::FRAME_SIZE)?;
                frames.write_frame(row, major as u16, minor, frame)?;
                pos += frame_store::FRAME_SIZE;
            }
        }
        for _ in 0..frame_store::PADDING_FRAMES_PER_ROW {
            let frame = take(&bytes, pos, frame_store::FRAME_SIZE)?;
            if frame.iter().any(|&b| b != 0xFF) {
                return Err(BitstreamError::BadPacket {
                    offset: pos,
                    reason: "non-0xFF byte in a row padding frame".to_string(),
                });
            }
            pos += frame_store::FRAME_SIZE;
        }
    }

    if (pos / 2) % 65 != 0 {
        return Err(BitstreamError::BadPacket {
            offset: 0,
            reason: format!("block-0 FDRI payload is {} words, not a multiple of 65", pos / 2),
        });
    }

    let bram = take(&bytes, pos, frame_store::BRAM_DATA_LEN)?;
    frames.as_bytes_mut()[frame_store::BRAM_DATA_START..frame_store::BRAM_DATA_START + frame_store::BRAM_DATA_LEN]
        .copy_from_slice(bram);
    pos += frame_store::BRAM_DATA_LEN;

    let iob = take(&bytes, pos, frame_store::IOB_DATA_LEN)?;
    frames.as_bytes_mut()[frame_store::IOB_DATA_START..frame_store::IOB_DATA_START + frame_store::IOB_DATA_LEN]
        .copy_from_slice(iob);
    pos += frame_store::IOB_DATA_LEN;

    let crc = take(&bytes, pos, 4)?;
    if bytes.len() != pos + 4 {
        return Err(BitstreamError::InternalInvariant {
            detail: format!("expected exactly 4 trailing auto-CRC bytes, found {}", bytes.len() - pos),
        });
    }
    Ok(u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]))
}

fn decode_value(register: Register, words: &[u16]) -> RegValue {
    if register == Register::FarMaj && words.len() == 2 {
        return RegValue::Far(words[0], words[1]);
    }
    let value = words.iter().fold(0u32, |acc, &w| (acc << 16) | w as u32);
    RegValue::Int(value)
}

fn write_reg(w: &mut impl Write, reg: Register, value: u32) -> BitResult<()> {
    let words = if value > 0xFFFF {
        vec![(value >> 16) as u16, value as u16]
    } else {
        vec![value as u16]
    };
    packet::write_packet(w, &Packet::T1Write { reg: reg.code(), words })
}

fn write_far_maj(w: &mut impl Write, row: u16, major: u16) -> BitResult<()> {
    packet::write_packet(
        w,
        &Packet::T1Write {
            reg: Register::FarMaj.code(),
            words: vec![row, major],
        },
    )
}

fn write_cmd(w: &mut impl Write, cmd: Cmd) -> BitResult<()> {
    write_reg(w, Register::Cmd, cmd as u32)
}

fn write_noop(w: &mut impl Write) -> BitResult<()> {
    packet::write_packet(w, &Packet::Noop)
}

fn write_u32(w: &mut impl Write, v: u32) -> BitResult<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn read_exact(r: &mut impl Read, buf: &mut [u8], what: &'static str) -> BitResult<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            BitstreamError::BadPacket {
                offset: 0,
                reason: format!("short read while reading {what}"),
            }
        } else {
            BitstreamError::Io(e)
        }
    })
}

fn io_to_short_read(e: std::io::Error, expected: usize) -> BitstreamError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        BitstreamError::ShortRead { offset: 0, expected }
    } else {
        BitstreamError::Io(e)
    }
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

    fn minors() -> Vec<u16> {
        let mut v = vec![0u16; 10];
        v[0] = frame_store::FRAMES_PER_ROW as u16;
        v
    }

    fn empty_config() -> Config {
        Config::new(DeviceVariant::Xc6Slx9, minors())
    }

    #[test]
    fn write_then_read_round_trips_header_and_device() {
        let header = sample_header();
        let config = empty_config();
        let mut buf = Cursor::new(Vec::new());
        write_bitfile(&mut buf, &header, &config).unwrap();

        buf.set_position(0);
        let parts = read_bitfile(&mut buf, &minors()).unwrap();
        assert_eq!(parts.header, header);
        assert_eq!(parts.config.device, DeviceVariant::Xc6Slx9);
        assert!(parts.config.log.has_required_prologue());
    }

    #[test]
    fn round_trip_preserves_frame_bits() {
        let header = sample_header();
        let mut config = empty_config();
        config
            .frames
            .set_bit(crate::frame_store::FrameCoordinate::new(0, 0, 3, 66))
            .unwrap();
        let mut buf = Cursor::new(Vec::new());
        write_bitfile(&mut buf, &header, &config).unwrap();

        buf.set_position(0);
        let parts = read_bitfile(&mut buf, &minors()).unwrap();
        assert!(parts
            .config
            .frames
            .get_bit(crate::frame_store::FrameCoordinate::new(0, 0, 3, 66))
            .unwrap());
    }

    #[test]
    fn missing_far_zero_before_wcfg_fails() {
        // Build a minimal malformed stream: header, IDCODE, FAR_MAJ(1,0), WCFG.
        let header = sample_header();
        let mut buf = Cursor::new(Vec::new());
        header.write(&mut buf).unwrap();
        buf.write_all(&[STREAM_CODE]).unwrap();
        let len_pos = buf.stream_position().unwrap();
        write_u32(&mut buf, 0).unwrap();
        buf.write_all(&[0xFFu8; FILLER_LEN]).unwrap();
        write_u32(&mut buf, SYNC_WORD).unwrap();
        write_reg(&mut buf, Register::Idcode, DeviceVariant::Xc6Slx9.idcode()).unwrap();
        write_far_maj(&mut buf, 1, 0).unwrap();
        write_cmd(&mut buf, Cmd::Wcfg).unwrap();
        let end = buf.stream_position().unwrap();
        let total_len = (end - len_pos - 4) as u32;
        buf.seek(SeekFrom::Start(len_pos)).unwrap();
        write_u32(&mut buf, total_len).unwrap();
        buf.seek(SeekFrom::Start(0)).unwrap();

        let err = read_bitfile(&mut buf, &minors()).unwrap_err();
        assert!(matches!(err, BitstreamError::BadFar { .. }));
    }

    #[test]
    fn flr_value_other_than_896_fails() {
        let header = sample_header();
        let mut buf = Cursor::new(Vec::new());
        header.write(&mut buf).unwrap();
        buf.write_all(&[STREAM_CODE]).unwrap();
        let len_pos = buf.stream_position().unwrap();
        write_u32(&mut buf, 0).unwrap();
        buf.write_all(&[0xFFu8; FILLER_LEN]).unwrap();
        write_u32(&mut buf, SYNC_WORD).unwrap();
        write_reg(&mut buf, Register::Flr, 123).unwrap();
        write_reg(&mut buf, Register::Idcode, DeviceVariant::Xc6Slx9.idcode()).unwrap();
        write_far_maj(&mut buf, 0, 0).unwrap();
        write_cmd(&mut buf, Cmd::Wcfg).unwrap();
        let end = buf.stream_position().unwrap();
        let total_len = (end - len_pos - 4) as u32;
        buf.seek(SeekFrom::Start(len_pos)).unwrap();
        write_u32(&mut buf, total_len).unwrap();
        buf.seek(SeekFrom::Start(0)).unwrap();

        let err = read_bitfile(&mut buf, &minors()).unwrap_err();
        assert!(matches!(err, BitstreamError::BadPacket { .. }));
    }

    #[test]
    fn short_fdri_payload_is_an_error_not_a_panic() {
        // A structurally valid Type-2 write (its announced word_count matches
        // what it actually carries) can still be far short of what this
        // device's geometry needs for a single frame.
        let header = sample_header();
        let mut buf = Cursor::new(Vec::new());
        header.write(&mut buf).unwrap();
        buf.write_all(&[STREAM_CODE]).unwrap();
        let len_pos = buf.stream_position().unwrap();
        write_u32(&mut buf, 0).unwrap();
        buf.write_all(&[0xFFu8; FILLER_LEN]).unwrap();
        write_u32(&mut buf, SYNC_WORD).unwrap();
        write_reg(&mut buf, Register::Flr, registers::FLR_VALUE).unwrap();
        write_reg(&mut buf, Register::Idcode, DeviceVariant::Xc6Slx9.idcode()).unwrap();
        write_far_maj(&mut buf, 0, 0).unwrap();
        write_cmd(&mut buf, Cmd::Wcfg).unwrap();
        packet::write_packet(
            &mut buf,
            &Packet::T2Write {
                word_count: 5,
                words: vec![0u16; 5],
            },
        )
        .unwrap();
        let end = buf.stream_position().unwrap();
        let total_len = (end - len_pos - 4) as u32;
        buf.seek(SeekFrom::Start(len_pos)).unwrap();
        write_u32(&mut buf, total_len).unwrap();
        buf.seek(SeekFrom::Start(0)).unwrap();

        let err = read_bitfile(&mut buf, &minors()).unwrap_err();
        assert!(matches!(err, BitstreamError::ShortRead { .. }));
    }
}
