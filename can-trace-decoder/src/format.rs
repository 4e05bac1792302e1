//! Canonical text rendering of a decoded trace
//!
//! A converted trace looks like this:
//!
//! ```text
//! InputFile: trace.bin
//! Version:   PeakUcan.dll V5.10r0005
//! Date/Time: 05.02.2015/10:30:00
//! OS:        V6.1.7601 Platform 2 'Service Pack 1'
//! Hardware:  ProductID 00001121h SerialNr 123456 DeviceNr 3 Firmware V3.05r0003
//! Channel0:  Mode 08h BTR0/1 001Ch BdrEx 00000000h AMR/ACR FFFFFFFFh/00000000h
//! Channel1:  off
//! ===============================================================================
//! DIR TIME(msec) ID------- DLC DATA-------------------
//! ===============================================================================
//! RX: 70417421.1      321h (8) FE DC BA 98 76 54 32 10
//!
//! Total number of CAN messages: 1
//! ```
//!
//! All functions here are pure; the only state is the [`DifferentialClock`]
//! used when timestamps are printed relative to the previous message.

use crate::config::DecoderConfig;
use crate::types::{
    CanRecord, CaptureTime, ChannelInfo, DecodedTrace, HardwareInfo, OsVersion,
};
use std::fmt::{self, Write as _};

/// Separator bounding the legend
pub const SEPARATOR: &str =
    "===============================================================================";

/// Column legend of the message table
pub const LEGEND: &str = "DIR TIME(msec) ID------- DLC DATA-------------------";

/// Prefix of the footer line
pub const FOOTER_PREFIX: &str = "Total number of CAN messages:";

/// Header values that can be rendered as text
#[derive(Debug, Clone, Copy)]
pub enum HeaderItem<'a> {
    /// PeakUcan.dll or firmware version code
    Version(u32),
    CaptureTime(&'a CaptureTime),
    OsVersion(&'a OsVersion),
    Hardware(&'a HardwareInfo),
    Channel(&'a ChannelInfo),
}

impl fmt::Display for HeaderItem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HeaderItem::Version(code) => {
                if code == 0 || code == u32::MAX {
                    return f.write_str("N/A");
                }
                let major = code & 0xFF;
                let minor = (code >> 8) & 0xFF;
                let release = code >> 16;
                write!(f, "V{}.{:02}r{:04}", major, minor, release)
            }
            HeaderItem::CaptureTime(t) => write!(
                f,
                "{:02}.{:02}.{:04}/{:02}:{:02}:{:02}",
                t.day, t.month, t.year, t.hour, t.minute, t.second
            ),
            HeaderItem::OsVersion(os) => write!(
                f,
                "V{}.{}.{} Platform {} '{}'",
                os.major, os.minor, os.build, os.platform_id, os.csd_version
            ),
            HeaderItem::Hardware(hw) => write!(
                f,
                "ProductID {:08X}h SerialNr {} DeviceNr {} Firmware {}",
                hw.product_code,
                hw.serial_nr,
                hw.device_nr,
                HeaderItem::Version(hw.firmware_version)
            ),
            HeaderItem::Channel(ch) => {
                if !ch.is_active {
                    return f.write_str("off");
                }
                write!(
                    f,
                    "Mode {:02X}h BTR0/1 {:02X}{:02X}h BdrEx {:08X}h AMR/ACR {:08X}h/{:08X}h",
                    ch.mode, ch.btr0, ch.btr1, ch.baudrate, ch.acceptance_mask, ch.acceptance_code
                )
            }
        }
    }
}

/// Produces the timestamp to print for each record
///
/// In differential mode the first record prints its raw time and every later
/// record the distance to the previous record's raw time. The previous value
/// is always the absolute timestamp, never an already converted delta.
#[derive(Debug, Clone, Default)]
pub struct DifferentialClock {
    differential: bool,
    previous: Option<u32>,
}

impl DifferentialClock {
    pub fn new(differential: bool) -> Self {
        Self {
            differential,
            previous: None,
        }
    }

    /// Timestamp to print for `raw`, advancing the clock
    pub fn next(&mut self, raw: u32) -> u32 {
        if !self.differential {
            return raw;
        }
        let printed = match self.previous {
            Some(prev) => raw.wrapping_sub(prev),
            None => raw,
        };
        self.previous = Some(raw);
        printed
    }
}

/// Render one message line
///
/// `time` is the value to print (absolute or differential). The line never
/// reads more than `min(dlc, 8)` data bytes.
pub fn format_record(
    record: &CanRecord,
    channel: &ChannelInfo,
    hardware: &HardwareInfo,
    time: u32,
) -> String {
    let id_padding = if record.flags.is_extended() { "" } else { "     " };
    let line = format!(
        "{}: {}{}{} ({}) {}",
        record.direction(),
        format_time(time, hardware.is_g4() && channel.high_res_timer()),
        id_padding,
        format_can_id(record),
        record.dlc,
        format_data(record)
    );
    line.trim_end().to_string()
}

/// CAN-ID column without padding, e.g. `123h` or `18FF0A01h`
pub fn format_can_id(record: &CanRecord) -> String {
    if record.flags.is_extended() {
        format!("{:08X}h", record.id)
    } else {
        format!("{:03X}h", record.id)
    }
}

/// Data column: eight byte positions, `--` past the DLC, or `Remote Request`
pub fn format_data(record: &CanRecord) -> String {
    if record.flags.is_remote() {
        return "Remote Request".to_string();
    }
    let payload = record.payload();
    (0..8)
        .map(|i| match payload.get(i) {
            Some(byte) => format!("{:02X}", byte),
            None => "--".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Time column including its trailing padding
pub fn format_time(time: u32, high_res: bool) -> String {
    if high_res {
        format!("{:08}.{:01} ", time / 10, time % 10)
    } else {
        format!("{:09}  ", time)
    }
}

/// Render all message lines of a trace
pub fn format_records(trace: &DecodedTrace, differential: bool) -> Vec<String> {
    let channel = trace.header.active_channel();
    let hardware = &trace.header.hardware;
    let mut clock = DifferentialClock::new(differential);

    trace
        .records
        .iter()
        .map(|record| format_record(record, channel, hardware, clock.next(record.time)))
        .collect()
}

/// Header block describing the capture
pub fn render_header(trace: &DecodedTrace, input_name: &str) -> String {
    let header = &trace.header;
    let mut out = String::with_capacity(512);
    let _ = writeln!(out, "InputFile: {}", input_name);
    let _ = writeln!(
        out,
        "Version:   PeakUcan.dll {}",
        HeaderItem::Version(header.version)
    );
    let _ = writeln!(
        out,
        "Date/Time: {}",
        HeaderItem::CaptureTime(&header.capture_time)
    );
    let _ = writeln!(out, "OS:        {}", HeaderItem::OsVersion(&header.os_version));
    let _ = writeln!(out, "Hardware:  {}", HeaderItem::Hardware(&header.hardware));
    let _ = writeln!(out, "Channel0:  {}", HeaderItem::Channel(&header.channels[0]));
    let _ = writeln!(out, "Channel1:  {}", HeaderItem::Channel(&header.channels[1]));
    out
}

/// Separator, legend, separator
pub fn legend() -> String {
    format!("{SEPARATOR}\n{LEGEND}\n{SEPARATOR}")
}

pub fn footer(count: usize) -> String {
    format!("{FOOTER_PREFIX} {count}")
}

/// Complete text trace: header block, legend, message lines, blank line, footer
pub fn render_trace(trace: &DecodedTrace, input_name: &str, config: &DecoderConfig) -> String {
    let lines = format_records(trace, config.differential);
    let mut out = String::with_capacity(1024 + lines.len() * 64);

    out.push_str(&render_header(trace, input_name));
    out.push_str(&legend());
    out.push('\n');
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&footer(lines.len()));
    out.push('\n');
    out
}
