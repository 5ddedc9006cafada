//! Error type for the bitstream codec.
//!
//! `BitstreamError` is deliberately distinct from [`aion_common::InternalError`]:
//! it reports malformed *input* (a bad file, an unsupported device, a corrupt
//! packet), not a bug in this crate. Every variant carries enough context for
//! a caller to explain the failure without re-deriving it from a byte offset.

use std::io;

/// Result alias used throughout the bitstream codec.
pub type BitResult<T> = Result<T, BitstreamError>;

/// A fatal, user-facing failure while decoding or encoding a bitstream.
#[derive(Debug, thiserror::Error)]
pub enum BitstreamError {
    /// The 13-byte magic prefix did not match.
    #[error("bad magic bytes at offset {offset}")]
    BadMagic {
        /// Byte offset at which the magic check was performed (always 0).
        offset: usize,
    },

    /// A header string field failed to parse (wrong code byte, length over
    /// `MAX_HEADER_STR_LEN`, or a non-NUL final byte).
    #[error("bad header field '{code}' at offset {offset}: {reason}")]
    BadHeader {
        /// The expected code byte ('a'..'d').
        code: u8,
        /// Byte offset into the input where the field starts.
        offset: usize,
        /// Human-readable explanation.
        reason: String,
    },

    /// The input ended before the announced length was satisfied.
    #[error("short read at offset {offset}: expected {expected} more bytes")]
    ShortRead {
        /// Byte offset at which the read was attempted.
        offset: usize,
        /// Number of bytes that were expected but unavailable.
        expected: usize,
    },

    /// A packet header carried an invalid type or opcode, or a type-2 header
    /// had a nonzero low 11 bits.
    #[error("bad packet at offset {offset}: {reason}")]
    BadPacket {
        /// Byte offset of the packet header.
        offset: usize,
        /// Human-readable explanation.
        reason: String,
    },

    /// An unrecognized or reserved register code was addressed by a packet.
    #[error("bad register code {code} at offset {offset}")]
    BadRegister {
        /// The raw 6-bit register code from the packet header.
        code: u16,
        /// Byte offset of the packet header.
        offset: usize,
    },

    /// A FAR write addressed a row/major/minor outside the device's geometry.
    #[error("bad FAR address (row={row}, major={major}, minor={minor}) at offset {offset}")]
    BadFar {
        /// Row component of the frame address.
        row: u16,
        /// Major component of the frame address.
        major: u16,
        /// Minor component of the frame address.
        minor: u16,
        /// Byte offset of the FAR_MAJ packet.
        offset: usize,
    },

    /// A bounded buffer (the register action log, the switch-match table)
    /// would have exceeded its fixed capacity.
    #[error("{what} overflowed its capacity of {capacity}")]
    PayloadOverflow {
        /// Which bounded buffer overflowed.
        what: &'static str,
        /// Its fixed capacity.
        capacity: usize,
    },

    /// A heap allocation for the frame buffer failed size validation (e.g.
    /// the announced FDRI length did not match the device's expected size).
    #[error("could not size frame buffer: {reason}")]
    AllocFailed {
        /// Human-readable explanation.
        reason: String,
    },

    /// One or more of the five fixed self-check bits were missing.
    #[error("missing default bit at (row={row}, major={major}, minor={minor}, bit={bit})")]
    DefaultBitsMissing {
        /// Row of the missing default bit.
        row: u16,
        /// Major of the missing default bit.
        major: u16,
        /// Minor of the missing default bit.
        minor: u16,
        /// Bit index within the frame.
        bit: u32,
    },

    /// The IDCODE did not match any device this crate knows how to decode.
    #[error("unsupported device idcode {idcode:#010x}")]
    UnsupportedDevice {
        /// The raw IDCODE register value.
        idcode: u32,
    },

    /// A condition that should be structurally impossible given the prior
    /// checks (e.g. `num_regs_before_bits` left unset after a successful
    /// parse). Indicates a bug in this crate's own bookkeeping, surfaced as
    /// a `BitstreamError` rather than an `InternalError` because it is still
    /// detected at the codec boundary, not deeper compiler internals.
    #[error("internal invariant violated: {detail}")]
    InternalInvariant {
        /// Description of the violated invariant.
        detail: String,
    },

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
