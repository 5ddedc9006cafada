//! The device-model boundary: geometry queries, attribute storage, and the
//! symbolic LUT codec, all supplied by the caller.
//!
//! This crate never builds a real device database — that is a separate
//! concern (tile/wire/switch graph population, explicitly out of scope; see
//! the crate-level docs). What it does need is a small, stable surface for
//! asking "where is this tile", "what switches does it have", and "what does
//! this truth table mean" — expressed here as traits so `extractor`/`emitter`
//! can be written and tested against a fixture without a real device.

use crate::error::BitResult;
use serde::{Deserialize, Serialize};

/// Device variants this crate tolerates on decode; exactly one (`Xc6Slx9`)
/// is supported end-to-end for encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceVariant {
    /// XC6SLX4, tqg144 package family.
    Xc6Slx4,
    /// XC6SLX9, the only variant supported for encode.
    Xc6Slx9,
}

impl DeviceVariant {
    /// The documented IDCODE for this variant.
    pub fn idcode(self) -> u32 {
        match self {
            DeviceVariant::Xc6Slx4 => 0x0401_6093,
            DeviceVariant::Xc6Slx9 => 0x0402_4093,
        }
    }

    /// Resolves a variant from a decoded IDCODE register value.
    pub fn from_idcode(idcode: u32) -> Option<DeviceVariant> {
        match idcode {
            0x0401_6093 => Some(DeviceVariant::Xc6Slx4),
            0x0402_4093 => Some(DeviceVariant::Xc6Slx9),
            _ => None,
        }
    }
}

/// Which of a logic tile's two sub-devices a LUT belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubDevice {
    /// The "M" sub-device (present in XM and center columns).
    M,
    /// The "X" sub-device (present in XM and XL columns).
    X,
}

/// One of the four LUTs hosted by a logic sub-device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LutName {
    /// LUT A.
    A,
    /// LUT B.
    B,
    /// LUT C.
    C,
    /// LUT D.
    D,
}

/// Input mux selection for an input IOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IMux {
    /// Non-inverted input path.
    I,
    /// Inverted input path.
    IB,
}

/// Output drive strength, in milliamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Drive {
    /// 2 mA.
    Ma2,
    /// 4 mA.
    Ma4,
    /// 6 mA.
    Ma6,
    /// 8 mA.
    Ma8,
    /// 12 mA.
    Ma12,
    /// 16 mA.
    Ma16,
    /// 24 mA.
    Ma24,
}

/// Output slew rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slew {
    /// Slow edge rate.
    Slow,
    /// Fast edge rate.
    Fast,
    /// Quiet I/O edge rate.
    QuietIo,
}

/// Behavior of an output driver while the device is held in suspend mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suspend {
    /// Retain the last driven value.
    LastVal,
    /// Tri-state.
    ThreeState,
    /// Tri-state with pull-up.
    ThreeStatePullup,
    /// Tri-state with pull-down.
    ThreeStatePulldown,
    /// Tri-state with bus-hold ("keeper").
    ThreeStateKeeper,
    /// Tri-state with the OCT termination left enabled.
    ThreeStateOctOn,
}

/// Decoded configuration of a single instantiated IOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IobConfig {
    /// An input pad, LVCMOS33 standard.
    Input {
        /// Which input path (direct or inverted) is selected.
        imux: IMux,
    },
    /// An output pad, LVCMOS33 standard.
    Output {
        /// Drive strength.
        drive: Drive,
        /// Slew rate.
        slew: Slew,
        /// Suspend-mode behavior.
        suspend: Suspend,
    },
}

/// One entry in a device's fixed LUT base-permutation table: which minor and
/// byte offset a `(sub_device, lut)` pair lives at, and the bit-scrambling
/// parameters `extractor`/`emitter` must hand to a [`LutExprCodec`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LutSlot {
    /// Sub-device this LUT belongs to.
    pub sub_device: SubDevice,
    /// Which LUT of the sub-device.
    pub lut: LutName,
    /// Minor index (low half; the high half lives at `minor_base + 1`).
    pub minor_base: u16,
    /// Byte offset within the frame (the `+4`/`+0` column in the permutation
    /// table).
    pub byte_offset: usize,
    /// Per-position bit permutation handed to the LUT codec.
    pub logic_base: [u8; 6],
    /// Whether bit 0 of the truth table is flipped for this position.
    pub flip_b0: bool,
}

/// One entry in a device's routing bit-position table: which wire pair a
/// switch connects, and where its enable bits live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchBitpos {
    /// Source wire name.
    pub from: &'static str,
    /// Destination wire name.
    pub to: &'static str,
    /// Minor the two-bit field (and, for non-20 minors, half the one-bit
    /// field) lives in.
    pub minor: u16,
    /// Bit offset of the two-bit field's high bit.
    pub two_bits_o: u32,
    /// The two-bit field's value when this switch is enabled.
    pub two_bits_val: u8,
    /// Bit offset of the one-bit field.
    pub one_bit_o: u32,
    /// Whether this switch may be traversed in either direction.
    pub bidir: bool,
}

/// A tile position resolved from device (y, x) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePos {
    /// Device row (0..NUM_ROWS).
    pub row: u16,
    /// x-major column index (`Model::x_major`).
    pub major: u16,
}

/// Geometry and mutation surface for the device this codec targets.
///
/// This crate never implements this trait against a real device database;
/// it ships only `#[cfg(test)]` fixtures. A caller supplies a real
/// implementation backed by its own tile/wire graph.
pub trait Model {
    /// Number of minor frames in major column `major`.
    fn minors_per_major(&self, major: u16) -> Option<u16>;

    /// The full per-major minor-count table, in major order.
    fn minors_per_major_table(&self) -> Vec<u16>;

    /// Resolves a device (row, y) pair into `(row, row_pos)`, where
    /// `row_pos` is the tile's vertical position within its row (0..16,
    /// with 8 reserved for HCLK). Returns `None` if `y` does not map to a
    /// valid row position.
    fn is_in_row(&self, y: u32) -> Option<(u16, u8)>;

    /// The x-major index of device column `x`.
    fn x_major(&self, x: u32) -> Option<u16>;

    /// Whether device column `x` is a routing column eligible for switch
    /// extraction/emission.
    fn is_routing_column(&self, x: u32) -> bool;

    /// Whether device row `y` is within the top/bottom I/O rows (excluded
    /// from routing-switch extraction) or is itself the horizontal clock
    /// row.
    fn is_io_or_hclk_row(&self, y: u32) -> bool;

    /// Device width in tile columns.
    fn width(&self) -> u32;

    /// Device height in tile rows.
    fn height(&self) -> u32;

    /// Whether column `x` hosts an XM-style logic sub-device pair.
    fn is_xm_column(&self, major: u16) -> bool;

    /// The major column index of the device's right-side IOB column, used
    /// for the global "first IOB" marker bit.
    fn right_side_major(&self) -> u16;

    /// Enumerates instantiated IOBs as `(site_index, y, x, config)`.
    fn iobs(&self) -> Vec<(u32, u32, u32, IobConfig)>;

    /// Records a decoded IOB during extraction.
    fn set_iob(&mut self, site_index: u32, config: IobConfig) -> BitResult<()>;

    /// Enumerates instantiated LUTs as `(y, x, sub_device, lut, truth_table)`.
    fn luts(&self) -> Vec<(u32, u32, SubDevice, LutName, u64)>;

    /// Records a decoded LUT truth table during extraction.
    fn set_lut(&mut self, y: u32, x: u32, sub_device: SubDevice, lut: LutName, truth_table: u64) -> BitResult<()>;

    /// Enumerates switches this model wants emitted, as `(y, x, from, to)`.
    fn used_switches(&self) -> Vec<(u32, u32, &'static str, &'static str)>;

    /// Records a decoded switch during extraction as a single-switch net.
    fn add_switch_net(&mut self, y: u32, x: u32, from: &'static str, to: &'static str) -> BitResult<()>;
}

/// Lookup of routing bit-positions, keyed by wire pair.
///
/// Kept separate from [`Model`] because the bitpos table is fixed silicon
/// data (see the crate's design notes on the minor-20 asymmetry), not part
/// of a specific device instance's mutable state.
pub trait BitposTable {
    /// All entries in the table, in no particular order.
    fn entries(&self) -> &[SwitchBitpos];

    /// Finds the entry matching `(from, to)` exactly, or `(to, from)` if
    /// the entry is bidirectional.
    fn find(&self, from: &str, to: &str) -> Option<&SwitchBitpos> {
        self.entries().iter().find(|e| {
            (e.from == from && e.to == to) || (e.bidir && e.from == to && e.to == from)
        })
    }
}

/// Symbolic boolean-expression codec for LUT truth tables.
///
/// Parsing/printing the symbolic expression language itself is out of
/// scope for this crate; this trait is the seam a caller plugs a real
/// implementation into. `logic_base`/`flip_b0` come from the fixed
/// permutation table (see [`LutSlot`]) and describe how the raw 64-bit
/// value is scrambled relative to canonical truth-table order.
pub trait LutExprCodec {
    /// The symbolic expression type this codec produces and consumes.
    type Expr;

    /// Unscrambles `raw` per `(logic_base, flip_b0)` and converts it to a
    /// symbolic expression.
    fn to_expr(&self, raw: u64, logic_base: [u8; 6], flip_b0: bool) -> BitResult<Self::Expr>;

    /// Converts a symbolic expression back into its scrambled 64-bit
    /// representation for the given permutation.
    fn from_expr(&self, expr: &Self::Expr, logic_base: [u8; 6], flip_b0: bool) -> BitResult<u64>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal hand-built test doubles. Not a device database — just enough
    //! geometry to drive `extractor`/`emitter` unit tests.

    use super::*;
    use std::cell::RefCell;

    /// A tiny single-row, single-major fixture device.
    pub struct FixtureModel {
        pub iobs: RefCell<Vec<(u32, IobConfig)>>,
        pub luts: RefCell<Vec<(u32, u32, SubDevice, LutName, u64)>>,
        pub switch_nets: RefCell<Vec<(u32, u32, &'static str, &'static str)>>,
        pub pending_switches: Vec<(u32, u32, &'static str, &'static str)>,
        pub minors: Vec<u16>,
    }

    impl FixtureModel {
        pub fn new(minors: Vec<u16>) -> FixtureModel {
            FixtureModel {
                iobs: RefCell::new(Vec::new()),
                luts: RefCell::new(Vec::new()),
                switch_nets: RefCell::new(Vec::new()),
                pending_switches: Vec::new(),
                minors,
            }
        }
    }

    impl Model for FixtureModel {
        fn minors_per_major(&self, major: u16) -> Option<u16> {
            self.minors.get(major as usize).copied()
        }

        fn minors_per_major_table(&self) -> Vec<u16> {
            self.minors.clone()
        }

        fn is_in_row(&self, y: u32) -> Option<(u16, u8)> {
            if y >= 16 {
                return None;
            }
            Some((0, y as u8))
        }

        fn x_major(&self, x: u32) -> Option<u16> {
            Some(x as u16)
        }

        fn is_routing_column(&self, _x: u32) -> bool {
            true
        }

        fn is_io_or_hclk_row(&self, _y: u32) -> bool {
            false
        }

        fn width(&self) -> u32 {
            1
        }

        fn height(&self) -> u32 {
            16
        }

        fn is_xm_column(&self, _major: u16) -> bool {
            true
        }

        fn right_side_major(&self) -> u16 {
            0
        }

        fn iobs(&self) -> Vec<(u32, u32, u32, IobConfig)> {
            self.iobs.borrow().iter().map(|(idx, cfg)| (*idx, 0, 0, *cfg)).collect()
        }

        fn set_iob(&mut self, site_index: u32, config: IobConfig) -> BitResult<()> {
            self.iobs.borrow_mut().push((site_index, config));
            Ok(())
        }

        fn luts(&self) -> Vec<(u32, u32, SubDevice, LutName, u64)> {
            self.luts.borrow().clone()
        }

        fn set_lut(&mut self, y: u32, x: u32, sub_device: SubDevice, lut: LutName, truth_table: u64) -> BitResult<()> {
            self.luts.borrow_mut().push((y, x, sub_device, lut, truth_table));
            Ok(())
        }

        fn used_switches(&self) -> Vec<(u32, u32, &'static str, &'static str)> {
            self.pending_switches.clone()
        }

        fn add_switch_net(&mut self, y: u32, x: u32, from: &'static str, to: &'static str) -> BitResult<()> {
            self.switch_nets.borrow_mut().push((y, x, from, to));
            Ok(())
        }
    }

    /// A codec that treats the raw 64-bit value as its own "expression" —
    /// enough to exercise the extractor/emitter seam without a symbolic
    /// expression language.
    pub struct IdentityLutCodec;

    impl LutExprCodec for IdentityLutCodec {
        type Expr = u64;

        fn to_expr(&self, raw: u64, _logic_base: [u8; 6], _flip_b0: bool) -> BitResult<u64> {
            Ok(raw)
        }

        fn from_expr(&self, expr: &u64, _logic_base: [u8; 6], _flip_b0: bool) -> BitResult<u64> {
            Ok(*expr)
        }
    }

    pub struct FixtureBitposTable {
        pub entries: Vec<SwitchBitpos>,
    }

    impl BitposTable for FixtureBitposTable {
        fn entries(&self) -> &[SwitchBitpos] {
            &self.entries
        }
    }
}
