//! Core types for the CAN trace decoder library
//!
//! This module defines the structures read from a USB-CANmodul binary trace
//! (header blocks and message records), the error type shared by every
//! operation of the library, and the frame flag bitset.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// File signature of a binary trace ("UCAN" read as little-endian u32)
pub const TRACE_SIGNATURE: u32 = 0x5543_414E;

/// Size of one encoded message record in bytes
pub const RECORD_SIZE: usize = 18;

/// Mask selecting the product id part of the hardware product code
pub const PRODUCT_CODE_PID_MASK: u32 = 0x0000_FFFF;

/// First product id of the fourth hardware generation (G4)
pub const PRODUCT_CODE_PID_G4: u32 = 0x0000_1121;

/// Channel mode bit enabling the high resolution timer (G4 only)
pub const MODE_HIGH_RES_TIMER: u8 = 0x08;

/// Hardware info struct sizes above this value carry the unique-id extension
pub const HW_INFO_EXTENDED_SIZE: u32 = 0x22;

/// Errors that can occur during decoding and analysis
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Input file does not exist: {0}")]
    InputNotFound(String),

    #[error("Could not create output file '{path}': {source}")]
    OutputCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid binary trace file (wrong signature 0x{0:08X})")]
    InvalidFormat(u32),

    #[error("Invalid binary trace file (message offset {offset} exceeds file length {length})")]
    CorruptOffset { offset: u32, length: u64 },

    #[error("File IO error after {records_read} messages: {source}")]
    Io {
        records_read: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion cancelled after {records_read} messages")]
    Cancelled { records_read: usize },

    #[error("Invalid filter criteria: {0}")]
    InvalidCriteria(String),
}

impl DecoderError {
    /// Numeric error code reported to the caller
    pub fn code(&self) -> u16 {
        match self {
            DecoderError::InputNotFound(_) => 0x1000,
            DecoderError::OutputCreate { .. } => 0x1001,
            DecoderError::InvalidFormat(_) => 0x1002,
            DecoderError::CorruptOffset { .. } => 0x1003,
            DecoderError::InvalidCriteria(_) => 0x2000,
            DecoderError::Cancelled { .. } => 0x7FFE,
            DecoderError::Io { .. } => 0x7FFF,
        }
    }

    /// Number of records decoded before the failure, if the error happened mid-stream
    pub fn records_read(&self) -> Option<usize> {
        match self {
            DecoderError::Io { records_read, .. } | DecoderError::Cancelled { records_read } => {
                Some(*records_read)
            }
            _ => None,
        }
    }

    pub(crate) fn io(records_read: usize, source: std::io::Error) -> Self {
        DecoderError::Io {
            records_read,
            source,
        }
    }
}

/// Frame format bits attached to every captured message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameFlags(pub u8);

impl FrameFlags {
    /// Message was transmitted by the local node (TX echo)
    pub const ECHO: u8 = 0x20;
    /// Remote transmission request frame
    pub const REMOTE: u8 = 0x40;
    /// 29-bit extended identifier
    pub const EXTENDED: u8 = 0x80;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_echo(self) -> bool {
        self.0 & Self::ECHO != 0
    }

    pub fn is_remote(self) -> bool {
        self.0 & Self::REMOTE != 0
    }

    pub fn is_extended(self) -> bool {
        self.0 & Self::EXTENDED != 0
    }
}

/// Message direction as shown in the text trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CAN message record decoded from the binary trace
///
/// The DLC is kept exactly as stored in the file. Consumers must clamp it with
/// [`CanRecord::payload`] before touching the data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanRecord {
    /// CAN identifier (11-bit or 29-bit)
    pub id: u32,
    /// Frame format flags
    pub flags: FrameFlags,
    /// Data length code as recorded (may exceed 8 in corrupt traces)
    pub dlc: u8,
    /// Fixed payload buffer
    pub data: [u8; 8],
    /// Raw timestamp in timer ticks
    pub time: u32,
}

impl CanRecord {
    /// Data bytes that are meaningful for this record (`min(dlc, 8)` bytes)
    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.dlc).min(self.data.len());
        &self.data[..len]
    }

    pub fn direction(&self) -> Direction {
        if self.flags.is_echo() {
            Direction::Tx
        } else {
            Direction::Rx
        }
    }
}

/// Creation date and time of the trace (Win32 SYSTEMTIME layout)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTime {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milliseconds: u16,
}

impl CaptureTime {
    /// Convert to a calendar timestamp, `None` if the stored fields are not a valid date
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_milli_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
            u32::from(self.milliseconds),
        )
    }
}

/// Operating system version of the capturing host (Win32 OSVERSIONINFO layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsVersion {
    /// Declared struct size, determines the length of the CSD string
    pub info_size: u32,
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub platform_id: u32,
    /// Service pack string, cut at the first NUL
    pub csd_version: String,
}

impl OsVersion {
    /// Number of CSD characters stored in the file for this struct size
    pub fn csd_len(&self) -> usize {
        self.info_size.saturating_sub(5 * 4) as usize
    }
}

/// Optional tail of the hardware info struct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfoExt {
    pub unique_id: [u32; 4],
    pub flags: u32,
}

/// USB-CANmodul hardware information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareInfo {
    /// Declared struct size
    pub size: u32,
    pub handle: u8,
    pub device_nr: u8,
    pub serial_nr: u32,
    pub firmware_version: u32,
    pub product_code: u32,
    /// Present when `size > 0x22`
    pub ext: Option<HardwareInfoExt>,
}

impl HardwareInfo {
    /// Whether the module belongs to the G4 generation
    pub fn is_g4(&self) -> bool {
        (self.product_code & PRODUCT_CODE_PID_MASK) >= PRODUCT_CODE_PID_G4
    }
}

/// Configuration of one CAN channel at capture time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub size: u32,
    pub mode: u8,
    pub btr0: u8,
    pub btr1: u8,
    pub ocr: u8,
    pub acceptance_mask: u32,
    pub acceptance_code: u32,
    pub baudrate: u32,
    /// Channel was initialised (active) during the capture
    pub is_active: bool,
    pub status: u16,
}

impl ChannelInfo {
    pub fn high_res_timer(&self) -> bool {
        self.mode & MODE_HIGH_RES_TIMER != 0
    }
}

/// Fixed header at the beginning of every binary trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHeader {
    pub signature: u32,
    /// Offset of the first message record
    pub message_offset: u32,
    /// PeakUcan.dll version code
    pub version: u32,
    pub capture_time: CaptureTime,
    pub os_version: OsVersion,
    pub hardware: HardwareInfo,
    pub channels: [ChannelInfo; 2],
}

impl TraceHeader {
    /// Channel used for formatting decisions: channel 0 if active, channel 1 otherwise
    pub fn active_channel(&self) -> &ChannelInfo {
        if self.channels[0].is_active {
            &self.channels[0]
        } else {
            &self.channels[1]
        }
    }

    /// Whether timestamps carry tenths of a millisecond
    pub fn high_res_timestamps(&self) -> bool {
        self.hardware.is_g4() && self.active_channel().high_res_timer()
    }
}

/// Complete result of decoding a binary trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTrace {
    pub header: TraceHeader,
    pub records: Vec<CanRecord>,
}

impl DecodedTrace {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
