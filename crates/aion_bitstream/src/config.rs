//! The owning container for a decoded (or to-be-encoded) configuration.

use crate::frame_store::FrameBuffer;
use crate::model::DeviceVariant;
use crate::registers::ConfigLog;

/// Owns the frame buffer and the register action log produced while parsing
/// (or consumed while emitting) one bitstream.
///
/// There is no explicit "free" entry point: dropping a `Config`, including
/// on an early return via `?` partway through parsing, releases the frame
/// buffer through ordinary `Drop`/scope-exit. No partial state escapes a
/// failed parse.
#[derive(Debug, Clone)]
pub struct Config {
    /// The device this configuration targets.
    pub device: DeviceVariant,
    /// The frame-addressed bit memory.
    pub frames: FrameBuffer,
    /// The register actions observed (or to be emitted) around the frame
    /// payload.
    pub log: ConfigLog,
    /// The auto-CRC value captured from (or to be written into) the
    /// bitstream.
    pub auto_crc: u32,
}

impl Config {
    /// Creates a fresh configuration with an empty frame buffer sized for
    /// `device`, using `minors_per_major` as the per-major minor-count
    /// table.
    pub fn new(device: DeviceVariant, minors_per_major: Vec<u16>) -> Config {
        Config {
            device,
            frames: FrameBuffer::new(minors_per_major),
            log: ConfigLog::new(),
            auto_crc: crate::registers::DEFAULT_AUTO_CRC,
        }
    }
}
