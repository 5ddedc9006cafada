//! Bitstream codec for the XC6SLX4/XC6SLX9 family of SRAM-based FPGAs.
//!
//! This crate converts between a vendor bitstream file (ASCII header,
//! packetized configuration-register command stream, embedded frame
//! payload) and a structured device-model view (IOBs, logic LUTs, routing
//! switches) of the same configuration memory. It does not build a device
//! database itself — that is supplied by a caller through the [`model`]
//! module's traits — and it does not compute a real CRC or parse the
//! symbolic LUT boolean-expression language; those are out of scope (see
//! [`model::LutExprCodec`]).
//!
//! The six cooperating components named in the design:
//!
//! - [`header`] — the fixed ASCII preamble (`HeaderCodec`).
//! - [`packet`] — the Type-1/Type-2 packet stream (`PacketStream`).
//! - [`registers`] / [`interpreter`] — the register vocabulary and the
//!   state machine that drives the frame store from it
//!   (`RegisterInterpreter`).
//! - [`frame_store`] — the typed bit memory (`FrameStore`).
//! - [`extractor`] — frame memory to device model (`ModelExtractor`).
//! - [`emitter`] — device model to frame memory (`ModelEmitter`).
//!
//! [`dump`] renders a parsed bitstream as the plain-text diagnostic format
//! used for regression diffs. [`decode_bitfile`] and [`encode_bitfile`] at
//! the crate root compose these into the two end-to-end operations;
//! callers needing finer control can drive `interpreter`/`extractor`/
//! `emitter` directly.

#![warn(missing_docs)]

pub mod config;
pub mod dump;
pub mod emitter;
pub mod error;
pub mod extractor;
pub mod frame_store;
pub mod header;
pub mod interpreter;
pub mod lut;
pub mod model;
pub mod packet;
pub mod registers;

pub use config::Config;
pub use error::{BitResult, BitstreamError};
pub use header::Header;
pub use interpreter::{read_bitfile, write_bitfile, BitfileParts};
pub use model::{BitposTable, DeviceVariant, LutExprCodec, Model};

use aion_diagnostics::DiagnosticSink;

/// Parses a complete bitstream file and populates `model` with the device
/// attributes it encodes.
///
/// Composes [`read_bitfile`] with [`extractor::extract_all`]: the returned
/// [`Header`] is the raw decoded preamble, already consumed into `model`
/// by the time this returns successfully. On any failure the frame buffer
/// inside the (local) [`Config`] is dropped before the error propagates —
/// no partial state escapes to `model`.
pub fn decode_bitfile<C: LutExprCodec>(
    r: &mut impl std::io::Read,
    model: &mut impl Model,
    bitpos: &impl BitposTable,
    codec: &C,
    sink: &DiagnosticSink,
) -> BitResult<Header> {
    let minors_per_major = model.minors_per_major_table();
    let BitfileParts { header, mut config } = read_bitfile(r, &minors_per_major)?;
    extractor::extract_all(&mut config.frames, model, bitpos, codec, sink)?;
    Ok(header)
}

/// Builds a fresh [`Config`] for `device`, emits `model`'s attributes into
/// its frame buffer, and writes a complete bitstream file to `w`.
///
/// Composes [`emitter::emit_all`] with [`write_bitfile`]. Only
/// [`DeviceVariant::Xc6Slx9`] is supported end-to-end for encode; other
/// variants are accepted by [`decode_bitfile`] but rejected here by the
/// emitter's own checks.
pub fn encode_bitfile<C: LutExprCodec>(
    w: &mut (impl std::io::Write + std::io::Seek),
    header: &Header,
    device: DeviceVariant,
    model: &impl Model,
    bitpos: &impl BitposTable,
    codec: &C,
    sink: &DiagnosticSink,
) -> BitResult<()> {
    let minors_per_major = model.minors_per_major_table();
    let mut config = Config::new(device, minors_per_major);
    emitter::emit_all(&mut config.frames, model, bitpos, codec, sink)?;
    write_bitfile(w, header, &config)
}
