//! Reads a populated [`FrameBuffer`] and populates a [`Model`] with the
//! device attributes it encodes: default-bits self-check, IOBs, logic LUTs,
//! and routing switches.

use crate::error::{BitResult, BitstreamError};
use crate::frame_store::{self, FrameBuffer, FrameCoordinate};
use crate::lut::{LUT_SLOTS, X_HEADER_MINOR, X_INSTANTIATED_SENTINEL};
use crate::model::{BitposTable, IMux, IobConfig, LutExprCodec, Model, SubDevice, Suspend};
use aion_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use aion_source::Span;

/// The five fixed (row, major, minor, bit) positions every valid bitstream
/// must set, used as a self-check before any other extraction runs.
pub const DEFAULT_BIT_POSITIONS: [(u16, u16, u16, u32); 5] = [
    (0, 0, 3, 66),
    (0, 1, 23, 1034),
    (0, 1, 23, 1035),
    (0, 1, 23, 1039),
    (2, 0, 3, 66),
];

/// Bit offset of the device-global "first IOB" marker within minor 22's
/// frame, on the row-0 right-side major column.
pub const FIRST_IOB_MARKER_MINOR: u16 = 22;
pub(crate) const FIRST_IOB_MARKER_BIT: u32 = 64 * 15 + frame_store::HCLK_BITS + 4;

const IOB_INSTANTIATED: u64 = 1 << 63;
const IOB_O_PINW: u64 = 1 << 62;
const IOB_IO_KIND_MASK: u64 = 0xF;
const IOB_IO_KIND_INPUT: u64 = 0;
const IOB_MUX_SHIFT: u32 = 4;
const IOB_MUX_MASK: u64 = 0x3 << IOB_MUX_SHIFT;
const IOB_SLEW_SHIFT: u32 = 6;
const IOB_SLEW_MASK: u64 = 0x3 << IOB_SLEW_SHIFT;
const IOB_SUSPEND_SHIFT: u32 = 8;
const IOB_SUSPEND_MASK: u64 = 0x7 << IOB_SUSPEND_SHIFT;

fn drive_to_kind(drive: crate::model::Drive) -> u64 {
    use crate::model::Drive::*;
    match drive {
        Ma2 => 1,
        Ma4 => 2,
        Ma6 => 3,
        Ma8 => 4,
        Ma12 => 5,
        Ma16 => 6,
        Ma24 => 7,
    }
}

fn kind_to_drive(kind: u64) -> Option<crate::model::Drive> {
    use crate::model::Drive::*;
    Some(match kind {
        1 => Ma2,
        2 => Ma4,
        3 => Ma6,
        4 => Ma8,
        5 => Ma12,
        6 => Ma16,
        7 => Ma24,
        _ => return None,
    })
}

fn slew_to_bits(slew: crate::model::Slew) -> u64 {
    use crate::model::Slew::*;
    match slew {
        Slow => 0,
        Fast => 1,
        QuietIo => 2,
    }
}

fn bits_to_slew(bits: u64) -> Option<crate::model::Slew> {
    use crate::model::Slew::*;
    Some(match bits {
        0 => Slow,
        1 => Fast,
        2 => QuietIo,
        _ => return None,
    })
}

fn suspend_to_bits(suspend: Suspend) -> u64 {
    use Suspend::*;
    match suspend {
        LastVal => 0,
        ThreeState => 1,
        ThreeStatePullup => 2,
        ThreeStatePulldown => 3,
        ThreeStateKeeper => 4,
        ThreeStateOctOn => 5,
    }
}

fn bits_to_suspend(bits: u64) -> Option<Suspend> {
    use Suspend::*;
    Some(match bits {
        0 => LastVal,
        1 => ThreeState,
        2 => ThreeStatePullup,
        3 => ThreeStatePulldown,
        4 => ThreeStateKeeper,
        5 => ThreeStateOctOn,
        _ => return None,
    })
}

/// Packs an [`IobConfig`] into the 64-bit word this crate stores in the
/// IOB data region.
pub fn pack_iob(config: IobConfig) -> u64 {
    let mut word = IOB_INSTANTIATED;
    match config {
        IobConfig::Input { imux } => {
            word |= IOB_IO_KIND_INPUT;
            let mux_bits = match imux {
                IMux::I => 0u64,
                IMux::IB => 1u64,
            };
            word |= mux_bits << IOB_MUX_SHIFT;
        }
        IobConfig::Output { drive, slew, suspend } => {
            word |= IOB_O_PINW;
            word |= drive_to_kind(drive);
            word |= slew_to_bits(slew) << IOB_SLEW_SHIFT;
            word |= suspend_to_bits(suspend) << IOB_SUSPEND_SHIFT;
        }
    }
    word
}

/// Unpacks a 64-bit IOB word into an [`IobConfig`], returning the residual
/// bits left over after every recognized field is cleared (non-zero residue
/// is reported as a warning, not a failure).
pub fn unpack_iob(word: u64) -> BitResult<(IobConfig, u64)> {
    let mut residue = word;
    if residue & IOB_INSTANTIATED == 0 {
        return Err(BitstreamError::InternalInvariant {
            detail: "unpack_iob called on a non-instantiated entry".to_string(),
        });
    }
    residue &= !IOB_INSTANTIATED;

    let kind = residue & IOB_IO_KIND_MASK;
    let config = if kind == IOB_IO_KIND_INPUT {
        residue &= !IOB_IO_KIND_MASK;
        let mux_bits = (residue & IOB_MUX_MASK) >> IOB_MUX_SHIFT;
        residue &= !IOB_MUX_MASK;
        let imux = match mux_bits {
            0 => IMux::I,
            1 => IMux::IB,
            _ => {
                return Err(BitstreamError::InternalInvariant {
                    detail: format!("unrecognized I_mux field {mux_bits}"),
                })
            }
        };
        IobConfig::Input { imux }
    } else {
        residue &= !IOB_IO_KIND_MASK;
        residue &= !IOB_O_PINW;
        let drive = kind_to_drive(kind).ok_or(BitstreamError::InternalInvariant {
            detail: format!("unrecognized drive field {kind}"),
        })?;
        let slew_bits = (residue & IOB_SLEW_MASK) >> IOB_SLEW_SHIFT;
        residue &= !IOB_SLEW_MASK;
        let slew = bits_to_slew(slew_bits).ok_or(BitstreamError::InternalInvariant {
            detail: format!("unrecognized slew field {slew_bits}"),
        })?;
        let suspend_bits = (residue & IOB_SUSPEND_MASK) >> IOB_SUSPEND_SHIFT;
        residue &= !IOB_SUSPEND_MASK;
        let suspend = bits_to_suspend(suspend_bits).ok_or(BitstreamError::InternalInvariant {
            detail: format!("unrecognized suspend field {suspend_bits}"),
        })?;
        IobConfig::Output { drive, slew, suspend }
    };
    Ok((config, residue))
}

/// Verifies the five default bits are set, then clears them, as a
/// self-check performed before any other extraction.
pub fn check_and_clear_default_bits(frames: &mut FrameBuffer) -> BitResult<()> {
    for &(row, major, minor, bit) in DEFAULT_BIT_POSITIONS.iter() {
        let c = FrameCoordinate::new(row, major, minor, bit);
        if !frames.get_bit(c)? {
            return Err(BitstreamError::DefaultBitsMissing { row, major, minor, bit });
        }
        frames.clear_bit(c)?;
    }
    Ok(())
}

/// Walks the IOB data region and records every instantiated entry into
/// `model`.
pub fn extract_iobs(frames: &mut FrameBuffer, model: &mut impl Model, sink: &DiagnosticSink) -> BitResult<()> {
    let right_major = model.right_side_major();
    let marker = FrameCoordinate::new(0, right_major, FIRST_IOB_MARKER_MINOR, FIRST_IOB_MARKER_BIT);
    let mut seen_any = false;

    for entry_idx in 0..frame_store::NUM_IOB_ENTRIES as u16 {
        let offset = entry_idx as usize * frame_store::IOB_ENTRY_LEN;
        let bytes = frames.as_bytes();
        let start = frame_store::IOB_DATA_START + offset;
        let word = u64::from_be_bytes(bytes[start..start + 8].try_into().unwrap());
        if word == 0 {
            continue;
        }

        if !seen_any {
            seen_any = true;
            if !frames.get_bit(marker)? {
                sink.emit(Diagnostic::warning(
                    DiagnosticCode::new(Category::Vendor, 1),
                    "IOBs instantiated but the first-IOB marker bit is not set",
                    Span::DUMMY,
                ));
            }
            frames.clear_bit(marker)?;
        }

        let (config, residue) = unpack_iob(word)?;
        if residue != 0 {
            sink.emit(Diagnostic::warning(
                DiagnosticCode::new(Category::Vendor, 2),
                format!("IOB entry {entry_idx} has residual bits {residue:#x} after known fields"),
                Span::DUMMY,
            ));
        }
        model.set_iob(entry_idx as u32, config)?;
        frames.as_bytes_mut()[start..start + 8].copy_from_slice(&0u64.to_be_bytes());
    }
    Ok(())
}

/// Decodes every logic tile's LUTs via the caller-supplied [`LutExprCodec`].
pub fn extract_logic<C: LutExprCodec>(
    frames: &mut FrameBuffer,
    model: &mut impl Model,
    codec: &C,
    sink: &DiagnosticSink,
) -> BitResult<()> {
    for major in 0..model.width() as u16 {
        if !model.is_xm_column(major) {
            continue;
        }
        for row in 0..frame_store::NUM_ROWS as u16 {
            let header = frames.get_u64(row, major, X_HEADER_MINOR, 0)?;
            let x_ready = header == X_INSTANTIATED_SENTINEL;
            if !x_ready {
                sink.emit(Diagnostic::warning(
                    DiagnosticCode::new(Category::Vendor, 3),
                    format!("row {row} major {major}: X sub-device header mismatch, skipping LUT decode"),
                    Span::DUMMY,
                ));
            }

            for slot in LUT_SLOTS.iter() {
                if slot.sub_device == SubDevice::X && !x_ready {
                    continue;
                }
                let raw = frames.read_lut64(row, major, slot.minor_base, slot.byte_offset)?;
                if raw == 0 {
                    continue;
                }
                // Decodability check only: `model.set_lut` stores the same
                // scrambled `raw` physical bits the emitter's round trip
                // expects back (see `emitter::emit_logic`), not the decoded
                // expression, since `Model::luts()`'s u64 is specified as
                // that raw representation and the symbolic expression itself
                // is this crate's declared out-of-scope boundary.
                codec.to_expr(raw, slot.logic_base, slot.flip_b0)?;
                model.set_lut(row as u32, major as u32, slot.sub_device, slot.lut, raw)?;
                frames.write_lut64(row, major, slot.minor_base, slot.byte_offset, 0)?;
            }
        }
    }
    Ok(())
}

/// Extracts every enabled routing switch across the device's routing
/// columns, excluding the top/bottom I/O rows and the horizontal clock row.
pub fn extract_switches(
    frames: &mut FrameBuffer,
    model: &mut impl Model,
    bitpos: &impl BitposTable,
) -> BitResult<()> {
    const MAX_YX_SWITCHES: usize = 1024;
    let mut found = Vec::new();

    for x in 0..model.width() {
        if !model.is_routing_column(x) {
            continue;
        }
        for y in 0..model.height() {
            if !model.is_routing_column(x) || model.is_io_or_hclk_row(y) {
                continue;
            }
            let Some((row, row_pos)) = model.is_in_row(y) else { continue };
            let Some(start_in_frame) = frame_store::row_pos_start_bit(row_pos) else { continue };
            let Some(major) = model.x_major(x) else { continue };

            for entry in bitpos.entries() {
                if is_switch_set(frames, row, major, start_in_frame, entry)? {
                    if found.len() >= MAX_YX_SWITCHES {
                        return Err(BitstreamError::PayloadOverflow {
                            what: "routing switch extraction buffer",
                            capacity: MAX_YX_SWITCHES,
                        });
                    }
                    found.push((y, x, entry.from, entry.to));
                    clear_switch_bits(frames, row, major, start_in_frame, entry)?;
                }
            }
        }
    }

    for (y, x, from, to) in found {
        model.add_switch_net(y, x, from, to)?;
    }
    Ok(())
}

/// Runs the full extraction pipeline over a populated [`FrameBuffer`]: the
/// default-bits self-check, then switches, then IOBs, then logic — the
/// inverse order of [`crate::emitter::emit_all`], since switches and IOBs
/// must be pulled clear of the frame memory before logic decode reads the
/// X sub-device header bits sharing the same columns.
pub fn extract_all<C: LutExprCodec>(
    frames: &mut FrameBuffer,
    model: &mut impl Model,
    bitpos: &impl BitposTable,
    codec: &C,
    sink: &DiagnosticSink,
) -> BitResult<()> {
    check_and_clear_default_bits(frames)?;
    extract_switches(frames, model, bitpos)?;
    extract_iobs(frames, model, sink)?;
    extract_logic(frames, model, codec, sink)?;
    Ok(())
}

fn is_switch_set(
    frames: &FrameBuffer,
    row: u16,
    major: u16,
    start_in_frame: u32,
    entry: &crate::model::SwitchBitpos,
) -> BitResult<bool> {
    if entry.minor == 20 {
        let hi = frames.get_bit(FrameCoordinate::new(row, major, 20, start_in_frame + entry.two_bits_o))?;
        let lo = frames.get_bit(FrameCoordinate::new(row, major, 20, start_in_frame + entry.two_bits_o + 1))?;
        let value = ((hi as u8) << 1) | (lo as u8);
        if value != entry.two_bits_val {
            return Ok(false);
        }
        Ok(frames.get_bit(FrameCoordinate::new(row, major, 20, start_in_frame + entry.one_bit_o))?)
    } else {
        let hi = frames.get_bit(FrameCoordinate::new(row, major, entry.minor, start_in_frame + entry.two_bits_o / 2))?;
        let lo = frames.get_bit(FrameCoordinate::new(row, major, entry.minor + 1, start_in_frame + entry.two_bits_o / 2))?;
        let value = ((hi as u8) << 1) | (lo as u8);
        if value != entry.two_bits_val {
            return Ok(false);
        }
        let one_bit_minor = entry.minor + (entry.one_bit_o as u16 & 1);
        Ok(frames.get_bit(FrameCoordinate::new(row, major, one_bit_minor, start_in_frame + entry.one_bit_o / 2))?)
    }
}

fn clear_switch_bits(
    frames: &mut FrameBuffer,
    row: u16,
    major: u16,
    start_in_frame: u32,
    entry: &crate::model::SwitchBitpos,
) -> BitResult<()> {
    if entry.minor == 20 {
        frames.clear_bit(FrameCoordinate::new(row, major, 20, start_in_frame + entry.two_bits_o))?;
        frames.clear_bit(FrameCoordinate::new(row, major, 20, start_in_frame + entry.two_bits_o + 1))?;
        frames.clear_bit(FrameCoordinate::new(row, major, 20, start_in_frame + entry.one_bit_o))?;
    } else {
        frames.clear_bit(FrameCoordinate::new(row, major, entry.minor, start_in_frame + entry.two_bits_o / 2))?;
        frames.clear_bit(FrameCoordinate::new(row, major, entry.minor + 1, start_in_frame + entry.two_bits_o / 2))?;
        let one_bit_minor = entry.minor + (entry.one_bit_o as u16 & 1);
        frames.clear_bit(FrameCoordinate::new(row, major, one_bit_minor, start_in_frame + entry.one_bit_o / 2))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{FixtureBitposTable, FixtureModel, IdentityLutCodec};
    use crate::model::{Drive, IobConfig, Slew, SwitchBitpos};

    fn geometry() -> Vec<u16> {
        vec![32, 32]
    }

    #[test]
    fn default_bits_round_trip() {
        let mut fb = FrameBuffer::new(geometry());
        for &(row, major, minor, bit) in DEFAULT_BIT_POSITIONS.iter() {
            fb.set_bit(FrameCoordinate::new(row, major, minor, bit)).unwrap();
        }
        check_and_clear_default_bits(&mut fb).unwrap();
        for &(row, major, minor, bit) in DEFAULT_BIT_POSITIONS.iter() {
            assert!(!fb.get_bit(FrameCoordinate::new(row, major, minor, bit)).unwrap());
        }
    }

    #[test]
    fn missing_default_bit_fails() {
        let mut fb = FrameBuffer::new(geometry());
        let err = check_and_clear_default_bits(&mut fb).unwrap_err();
        assert!(matches!(err, BitstreamError::DefaultBitsMissing { .. }));
    }

    #[test]
    fn iob_pack_unpack_round_trip_input() {
        let cfg = IobConfig::Input { imux: IMux::IB };
        let word = pack_iob(cfg);
        let (decoded, residue) = unpack_iob(word).unwrap();
        assert_eq!(decoded, cfg);
        assert_eq!(residue, 0);
    }

    #[test]
    fn iob_pack_unpack_round_trip_output() {
        let cfg = IobConfig::Output { drive: Drive::Ma8, slew: Slew::Fast, suspend: Suspend::ThreeState };
        let word = pack_iob(cfg);
        let (decoded, residue) = unpack_iob(word).unwrap();
        assert_eq!(decoded, cfg);
        assert_eq!(residue, 0);
    }

    #[test]
    fn extract_iobs_recovers_instantiated_entry() {
        let mut fb = FrameBuffer::new(geometry());
        let mut model = FixtureModel::new(geometry());
        let sink = DiagnosticSink::new();

        let marker = FrameCoordinate::new(0, model.right_side_major(), FIRST_IOB_MARKER_MINOR, FIRST_IOB_MARKER_BIT);
        fb.set_bit(marker).unwrap();
        let word = pack_iob(IobConfig::Input { imux: IMux::I });
        let start = frame_store::IOB_DATA_START;
        fb.as_bytes_mut()[start..start + 8].copy_from_slice(&word.to_be_bytes());

        extract_iobs(&mut fb, &mut model, &sink).unwrap();
        assert_eq!(model.iobs().len(), 1);
        assert!(!sink.has_errors());
    }

    #[test]
    fn extract_switches_recovers_single_switch() {
        let entries = vec![SwitchBitpos {
            from: "A",
            to: "B",
            minor: 3,
            two_bits_o: 0,
            two_bits_val: 0b11,
            one_bit_o: 2,
            bidir: false,
        }];
        let bitpos = FixtureBitposTable { entries };
        let mut fb = FrameBuffer::new(vec![8]);
        let mut model = FixtureModel::new(vec![8]);

        let start = frame_store::row_pos_start_bit(0).unwrap();
        fb.set_bit(FrameCoordinate::new(0, 0, 3, start)).unwrap();
        fb.set_bit(FrameCoordinate::new(0, 0, 4, start)).unwrap();
        fb.set_bit(FrameCoordinate::new(0, 0, 3, start + 1)).unwrap();

        extract_switches(&mut fb, &mut model, &bitpos).unwrap();
        assert_eq!(model.switch_nets.borrow().len(), 1);
        assert!(!fb.get_bit(FrameCoordinate::new(0, 0, 3, start)).unwrap());
        assert!(!fb.get_bit(FrameCoordinate::new(0, 0, 4, start)).unwrap());
        assert!(!fb.get_bit(FrameCoordinate::new(0, 0, 3, start + 1)).unwrap());
    }

    #[test]
    fn _unused_codec_reference() {
        let _codec = IdentityLutCodec;
    }
}
