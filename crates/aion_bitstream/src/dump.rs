//! Human-readable text rendering of a parsed bitstream, for diffing and
//! debugging. Deliberately geometry-independent: it renders the packet and
//! register log, not a full per-device-type frame atlas.

use crate::frame_store::{self, FrameBuffer};
use crate::registers::{Cmd, ConfigLog, RegAction, RegValue, Register};
use std::fmt::Write as _;

/// Renders a [`ConfigLog`] as one line per recorded action, collapsing
/// consecutive NOOPs into a single `noop [times N]` line.
pub fn dump_actions(log: &ConfigLog) -> String {
    let mut out = String::new();
    let actions = log.actions();
    let mut i = 0;
    while i < actions.len() {
        match &actions[i] {
            RegAction::Noop => {
                let start = i;
                while i < actions.len() && actions[i] == RegAction::Noop {
                    i += 1;
                }
                let count = i - start;
                if count == 1 {
                    writeln!(out, "noop").unwrap();
                } else {
                    writeln!(out, "noop [times {count}]").unwrap();
                }
            }
            RegAction::Write { reg, value } => {
                writeln!(out, "T1 {} {}", reg_name(*reg), format_value(*reg, *value)).unwrap();
                i += 1;
            }
            RegAction::Read { reg, word_count } => {
                writeln!(out, "T1 {} <read {word_count}>", reg_name(*reg)).unwrap();
                i += 1;
            }
        }
    }
    out
}

/// Renders a single Type-2 FDRI write line.
pub fn dump_fdri_header(word_count: u32) -> String {
    format!("T2 FDRI {word_count}\n")
}

fn format_value(reg: Register, value: RegValue) -> String {
    match (reg, value) {
        (Register::FarMaj, RegValue::Far(row, major)) => format!("row={row} major={major}"),
        (Register::Cmd, RegValue::Int(v)) => match Cmd::from_raw(v) {
            Some(cmd) => format!("{cmd:?}"),
            None => format!("{v:#x}"),
        },
        (_, RegValue::Int(v)) => format!("{v:#06x}"),
        (_, RegValue::Far(row, major)) => format!("row={row} major={major}"),
    }
}

fn reg_name(reg: Register) -> &'static str {
    match reg {
        Register::Crc => "CRC",
        Register::FarMaj => "FAR_MAJ",
        Register::FarMin => "FAR_MIN",
        Register::Fdri => "FDRI",
        Register::Fdro => "FDRO",
        Register::Cmd => "CMD",
        Register::Ctl => "CTL",
        Register::Mask => "MASK",
        Register::Stat => "STAT",
        Register::Lout => "LOUT",
        Register::Cor1 => "COR1",
        Register::Cor2 => "COR2",
        Register::PwrdnReg => "PWRDN_REG",
        Register::Flr => "FLR",
        Register::Idcode => "IDCODE",
        Register::Cwdt => "CWDT",
        Register::HcOptReg => "HC_OPT_REG",
        Register::Csbo => "CSBO",
        Register::General1 => "GENERAL1",
        Register::General2 => "GENERAL2",
        Register::General3 => "GENERAL3",
        Register::General4 => "GENERAL4",
        Register::General5 => "GENERAL5",
        Register::ModeReg => "MODE_REG",
        Register::PuGwe => "PU_GWE",
        Register::PuGts => "PU_GTS",
        Register::Mfwr => "MFWR",
        Register::CclkFreq => "CCLK_FREQ",
        Register::SeuOpt => "SEU_OPT",
        Register::ExpSign => "EXP_SIGN",
        Register::RdbkSign => "RDBK_SIGN",
        Register::Bootsts => "BOOTSTS",
        Register::EyeMask => "EYE_MASK",
        Register::CbcReg => "CBC_REG",
    }
}

/// Renders the full 64-bit binary line for a `v64_<pos>` frame-pair read,
/// e.g. `r0 ma1 v64_03 mi20 0000...`. `pos` is the row position within the
/// tile (0..15), distinct from `minor`; `bits` is 64 ASCII `'0'`/`'1'`
/// characters, bit 0 first.
pub fn dump_switch_binary(row: u16, major: u16, pos: u16, minor: u16, bits: &str) -> String {
    format!("r{row} ma{major} v64_{pos:02} mi{minor} {bits}")
}

/// Renders a single set-bit shorthand line within a `v64_<pos>` frame pair,
/// e.g. `r0 ma1 v64_03 mi20 b7`.
pub fn dump_switch_bit(row: u16, major: u16, pos: u16, minor: u16, bit: u32) -> String {
    format!("r{row} ma{major} v64_{pos:02} mi{minor} b{bit}")
}

/// Renders every non-zero block-RAM frame as a `br<row> ramb16 i<index> {
/// <hex bytes> }` line. Zero-filled frames (an uninstantiated or
/// all-default RAMB16) are skipped, matching the rest of the dump surface's
/// convention of only showing configured state.
pub fn dump_bram_region(frames: &FrameBuffer) -> String {
    let mut out = String::new();
    for row in 0..frame_store::NUM_BRAM_ROWS as u16 {
        for index in 0..frame_store::BRAM_FRAMES_PER_ROW as u16 {
            let frame = frames.read_bram_frame(row, index).expect("row/index within range by construction");
            if frame.iter().all(|&b| b == 0) {
                continue;
            }
            write!(out, "br{row} ramb16 i{index} {{ ").unwrap();
            for byte in frame {
                write!(out, "{byte:02x}").unwrap();
            }
            writeln!(out, " }}").unwrap();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_consecutive_noops() {
        let mut log = ConfigLog::new();
        for _ in 0..3 {
            log.push(RegAction::Noop).unwrap();
        }
        log.push(RegAction::Write {
            reg: Register::Flr,
            value: RegValue::Int(896),
        })
        .unwrap();
        log.push(RegAction::Noop).unwrap();

        let text = dump_actions(&log);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "noop [times 3]");
        assert_eq!(lines[1], "T1 FLR 0x0380");
        assert_eq!(lines[2], "noop");
    }

    #[test]
    fn single_noop_not_collapsed() {
        let mut log = ConfigLog::new();
        log.push(RegAction::Noop).unwrap();
        assert_eq!(dump_actions(&log), "noop\n");
    }

    #[test]
    fn far_maj_renders_row_and_major() {
        let mut log = ConfigLog::new();
        log.push(RegAction::Write {
            reg: Register::FarMaj,
            value: RegValue::Far(2, 5),
        })
        .unwrap();
        assert_eq!(dump_actions(&log), "T1 FAR_MAJ row=2 major=5\n");
    }

    #[test]
    fn cmd_renders_symbolic_name() {
        let mut log = ConfigLog::new();
        log.push(RegAction::Write {
            reg: Register::Cmd,
            value: RegValue::Int(Cmd::Wcfg as u32),
        })
        .unwrap();
        assert_eq!(dump_actions(&log), "T1 CMD Wcfg\n");
    }

    #[test]
    fn fdri_header_line() {
        assert_eq!(dump_fdri_header(12345), "T2 FDRI 12345\n");
    }

    #[test]
    fn switch_binary_line_uses_pos_not_minor_in_v64_slot() {
        let bits = "1".repeat(64);
        let line = dump_switch_binary(0, 1, 3, 20, &bits);
        assert_eq!(line, format!("r0 ma1 v64_03 mi20 {bits}"));
    }

    #[test]
    fn switch_bit_line_uses_pos_not_minor_in_v64_slot() {
        assert_eq!(dump_switch_bit(0, 1, 3, 20, 7), "r0 ma1 v64_03 mi20 b7");
    }

    #[test]
    fn bram_dump_skips_zero_frames_and_renders_nonzero_ones() {
        let mut fb = crate::frame_store::FrameBuffer::new(vec![4]);
        assert_eq!(dump_bram_region(&fb), "");

        let offset = frame_store::BRAM_DATA_START + 2 * frame_store::FRAME_SIZE;
        fb.as_bytes_mut()[offset] = 0xAB;
        fb.as_bytes_mut()[offset + 1] = 0xCD;

        let text = dump_bram_region(&fb);
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("br0 ramb16 i2 { abcd"));
        assert!(text.trim_end().ends_with('}'));
    }
}
