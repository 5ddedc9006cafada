//! Writes a [`Model`]'s device attributes into a [`FrameBuffer`]: the
//! inverse of [`crate::extractor`].

use crate::error::BitResult;
use crate::extractor::{pack_iob, DEFAULT_BIT_POSITIONS, FIRST_IOB_MARKER_BIT, FIRST_IOB_MARKER_MINOR};
use crate::frame_store::{self, FrameBuffer, FrameCoordinate};
use crate::lut::{slot_for, X_HEADER_MINOR, X_INSTANTIATED_SENTINEL};
use crate::model::{BitposTable, LutExprCodec, Model, SubDevice};
use aion_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use aion_source::Span;

/// A fixed per-side fallback table for ILOGIC tile switches that aren't
/// reachable through the ordinary routing-column bitpos table. Emission
/// warns, rather than fails, when a requested switch isn't covered here
/// either — matching the tolerant behavior of routing-column emission for
/// switches a caller's model requests but this crate cannot place.
const IOLOGIC_FALLBACK: &[(&str, &str)] = &[];

/// Sets the five fixed self-check bits every valid bitstream carries.
pub fn emit_default_bits(frames: &mut FrameBuffer) -> BitResult<()> {
    for &(row, major, minor, bit) in DEFAULT_BIT_POSITIONS.iter() {
        frames.set_bit(FrameCoordinate::new(row, major, minor, bit))?;
    }
    Ok(())
}

/// Emits every IOB the model has instantiated, plus the global first-IOB
/// marker bit if any IOB was written.
pub fn emit_iobs(frames: &mut FrameBuffer, model: &impl Model) -> BitResult<()> {
    let entries = model.iobs();
    if entries.is_empty() {
        return Ok(());
    }
    let right_major = model.right_side_major();
    frames.set_bit(FrameCoordinate::new(0, right_major, FIRST_IOB_MARKER_MINOR, FIRST_IOB_MARKER_BIT))?;

    for (site_index, _y, _x, config) in entries {
        let word = pack_iob(config);
        let offset = frame_store::IOB_DATA_START + site_index as usize * frame_store::IOB_ENTRY_LEN;
        frames.as_bytes_mut()[offset..offset + 8].copy_from_slice(&word.to_be_bytes());
    }
    Ok(())
}

/// Emits every LUT the model has instantiated. LUT D of the X sub-device is
/// only reachable in XM columns; a request to place it anywhere else is
/// reported as an error diagnostic (not a hard failure) and skipped, since
/// a caller's model may otherwise be entirely valid.
pub fn emit_logic<C: LutExprCodec>(
    frames: &mut FrameBuffer,
    model: &impl Model,
    codec: &C,
    sink: &DiagnosticSink,
) -> BitResult<()> {
    let mut x_ready_tiles = std::collections::HashSet::new();

    for (y, x, sub_device, lut, truth_table) in model.luts() {
        let Some(major) = model.x_major(x) else {
            sink.emit(Diagnostic::error(
                DiagnosticCode::new(Category::Error, 1),
                format!("LUT at (y={y}, x={x}) does not resolve to a device column"),
                Span::DUMMY,
            ));
            continue;
        };
        let Some((row, _row_pos)) = model.is_in_row(y) else {
            sink.emit(Diagnostic::error(
                DiagnosticCode::new(Category::Error, 2),
                format!("LUT at (y={y}, x={x}) does not resolve to a device row"),
                Span::DUMMY,
            ));
            continue;
        };

        if sub_device == SubDevice::X && !model.is_xm_column(major) {
            sink.emit(Diagnostic::error(
                DiagnosticCode::new(Category::Error, 3),
                format!("X sub-device LUT requested outside an XM column at (row={row}, major={major})"),
                Span::DUMMY,
            ));
            continue;
        }

        let Some(slot) = slot_for(sub_device, lut) else {
            sink.emit(Diagnostic::error(
                DiagnosticCode::new(Category::Error, 4),
                format!("no fixed slot for {sub_device:?}/{lut:?}"),
                Span::DUMMY,
            ));
            continue;
        };

        let raw = codec.from_expr(&codec.to_expr(truth_table, slot.logic_base, slot.flip_b0)?, slot.logic_base, slot.flip_b0)?;
        frames.write_lut64(row, major, slot.minor_base, slot.byte_offset, raw)?;

        if sub_device == SubDevice::X {
            x_ready_tiles.insert((row, major));
        }
    }

    for (row, major) in x_ready_tiles {
        frames.set_u64(row, major, X_HEADER_MINOR, 0, X_INSTANTIATED_SENTINEL)?;
    }
    Ok(())
}

/// Emits every switch the model requests: routing-column switches first
/// (via the bitpos table), then the fixed ILOGIC fallback table. A switch
/// covered by neither is reported as a warning, not a failure.
pub fn emit_switches(
    frames: &mut FrameBuffer,
    model: &impl Model,
    bitpos: &impl BitposTable,
    sink: &DiagnosticSink,
) -> BitResult<()> {
    for (y, x, from, to) in model.used_switches() {
        if write_routing_switch(frames, model, bitpos, y, x, from, to)? {
            continue;
        }
        if write_iologic_switch(from, to) {
            continue;
        }
        sink.emit(Diagnostic::warning(
            DiagnosticCode::new(Category::Vendor, 10),
            format!("switch {from}->{to} at (y={y}, x={x}) has no known bit position, skipped"),
            Span::DUMMY,
        ));
    }
    Ok(())
}

fn write_routing_switch(
    frames: &mut FrameBuffer,
    model: &impl Model,
    bitpos: &impl BitposTable,
    y: u32,
    x: u32,
    from: &str,
    to: &str,
) -> BitResult<bool> {
    if !model.is_routing_column(x) || model.is_io_or_hclk_row(y) {
        return Ok(false);
    }
    let Some((row, row_pos)) = model.is_in_row(y) else { return Ok(false) };
    let Some(start_in_frame) = frame_store::row_pos_start_bit(row_pos) else { return Ok(false) };
    let Some(major) = model.x_major(x) else { return Ok(false) };
    let Some(entry) = bitpos.find(from, to) else { return Ok(false) };

    if entry.minor == 20 {
        let hi = (entry.two_bits_val >> 1) & 1 != 0;
        let lo = entry.two_bits_val & 1 != 0;
        set_bit_if(frames, row, major, 20, start_in_frame + entry.two_bits_o, hi)?;
        set_bit_if(frames, row, major, 20, start_in_frame + entry.two_bits_o + 1, lo)?;
        set_bit_if(frames, row, major, 20, start_in_frame + entry.one_bit_o, true)?;
    } else {
        let hi = (entry.two_bits_val >> 1) & 1 != 0;
        let lo = entry.two_bits_val & 1 != 0;
        set_bit_if(frames, row, major, entry.minor, start_in_frame + entry.two_bits_o / 2, hi)?;
        set_bit_if(frames, row, major, entry.minor + 1, start_in_frame + entry.two_bits_o / 2, lo)?;
        let one_bit_minor = entry.minor + (entry.one_bit_o as u16 & 1);
        set_bit_if(frames, row, major, one_bit_minor, start_in_frame + entry.one_bit_o / 2, true)?;
    }
    Ok(true)
}

fn set_bit_if(frames: &mut FrameBuffer, row: u16, major: u16, minor: u16, bit: u32, value: bool) -> BitResult<()> {
    let c = FrameCoordinate::new(row, major, minor, bit);
    if value {
        frames.set_bit(c)
    } else {
        frames.clear_bit(c)
    }
}

fn write_iologic_switch(from: &str, to: &str) -> bool {
    IOLOGIC_FALLBACK.iter().any(|&(f, t)| f == from && t == to)
}

/// Runs the full emission order this crate uses when assembling a frame
/// buffer from a model: default bits, switches, IOBs, logic.
pub fn emit_all<C: LutExprCodec>(
    frames: &mut FrameBuffer,
    model: &impl Model,
    bitpos: &impl BitposTable,
    codec: &C,
    sink: &DiagnosticSink,
) -> BitResult<()> {
    emit_default_bits(frames)?;
    emit_switches(frames, model, bitpos, sink)?;
    emit_iobs(frames, model)?;
    emit_logic(frames, model, codec, sink)?;
    Ok(())
}
