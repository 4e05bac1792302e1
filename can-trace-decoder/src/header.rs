//! Binary trace header codec
//!
//! Layout of the file header (all values little-endian):
//!
//! ```text
//! 0x0000  signature 0x5543414E                     u32
//! 0x0004  offset of the first CAN message          u32
//! 0x0008  PeakUcan.dll version code                u32
//! 0x000C  creation date/time (SYSTEMTIME)          8 x u16
//! 0x001C  OS version (OSVERSIONINFO)               5 x u32 + CSD string
//! 0x00B0  hardware info (tUcanHardwareInfoEx)      18 or 38 bytes
//! 0x00D6  channel 0 info (tUcanChannelInfo)        26 bytes
//! 0x00F0  channel 1 info (tUcanChannelInfo)        26 bytes
//! 0x010A  first CAN message
//! ```
//!
//! The offsets shown are those of a trace written by a G4 module on Windows
//! with a 148 byte OSVERSIONINFO; the OS and hardware blocks are variable
//! sized, so fields are always read sequentially.

use crate::types::{
    CaptureTime, ChannelInfo, DecoderError, HardwareInfo, HardwareInfoExt, OsVersion, Result,
    TraceHeader, HW_INFO_EXTENDED_SIZE, TRACE_SIGNATURE,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Decode and validate the trace header
///
/// `stream_len` is the total length of the input and is used to validate the
/// declared message offset. On success the reader is positioned right after
/// the second channel info block.
pub fn decode_header<R: Read>(reader: &mut R, stream_len: u64) -> Result<TraceHeader> {
    let signature = read_u32(reader)?;
    if signature != TRACE_SIGNATURE {
        return Err(DecoderError::InvalidFormat(signature));
    }

    let message_offset = read_u32(reader)?;
    if u64::from(message_offset) > stream_len {
        return Err(DecoderError::CorruptOffset {
            offset: message_offset,
            length: stream_len,
        });
    }

    let version = read_u32(reader)?;
    let capture_time = read_capture_time(reader).map_err(header_io)?;
    let os_version = read_os_version(reader).map_err(header_io)?;
    let hardware = read_hardware_info(reader).map_err(header_io)?;
    let channel0 = read_channel_info(reader).map_err(header_io)?;
    let channel1 = read_channel_info(reader).map_err(header_io)?;

    log::debug!(
        "Trace header: version 0x{:08X}, product code 0x{:08X}, channel0 {}, channel1 {}",
        version,
        hardware.product_code,
        if channel0.is_active { "on" } else { "off" },
        if channel1.is_active { "on" } else { "off" },
    );

    Ok(TraceHeader {
        signature,
        message_offset,
        version,
        capture_time,
        os_version,
        hardware,
        channels: [channel0, channel1],
    })
}

/// Number of bytes [`encode_header`] writes for this header
pub fn encoded_len(header: &TraceHeader) -> usize {
    let hardware = if header.hardware.ext.is_some() { 38 } else { 18 };
    3 * 4 + 16 + 5 * 4 + header.os_version.csd_len() + hardware + 2 * 26
}

/// Write the header in the binary trace layout
///
/// The CSD string is NUL padded (or truncated) to the length implied by
/// `os_version.info_size`, and the hardware extension is written whenever
/// `hardware.ext` is present.
pub fn encode_header<W: Write>(header: &TraceHeader, writer: &mut W) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(header.signature)?;
    writer.write_u32::<LittleEndian>(header.message_offset)?;
    writer.write_u32::<LittleEndian>(header.version)?;

    let t = &header.capture_time;
    for value in [
        t.year,
        t.month,
        t.day_of_week,
        t.day,
        t.hour,
        t.minute,
        t.second,
        t.milliseconds,
    ] {
        writer.write_u16::<LittleEndian>(value)?;
    }

    let os = &header.os_version;
    for value in [os.info_size, os.major, os.minor, os.build, os.platform_id] {
        writer.write_u32::<LittleEndian>(value)?;
    }
    let mut csd = vec![0u8; os.csd_len()];
    for (slot, byte) in csd.iter_mut().zip(os.csd_version.bytes()) {
        *slot = byte;
    }
    writer.write_all(&csd)?;

    let hw = &header.hardware;
    writer.write_u32::<LittleEndian>(hw.size)?;
    writer.write_u8(hw.handle)?;
    writer.write_u8(hw.device_nr)?;
    writer.write_u32::<LittleEndian>(hw.serial_nr)?;
    writer.write_u32::<LittleEndian>(hw.firmware_version)?;
    writer.write_u32::<LittleEndian>(hw.product_code)?;
    if let Some(ext) = &hw.ext {
        for word in ext.unique_id {
            writer.write_u32::<LittleEndian>(word)?;
        }
        writer.write_u32::<LittleEndian>(ext.flags)?;
    }

    for channel in &header.channels {
        writer.write_u32::<LittleEndian>(channel.size)?;
        writer.write_u8(channel.mode)?;
        writer.write_u8(channel.btr0)?;
        writer.write_u8(channel.btr1)?;
        writer.write_u8(channel.ocr)?;
        writer.write_u32::<LittleEndian>(channel.acceptance_mask)?;
        writer.write_u32::<LittleEndian>(channel.acceptance_code)?;
        writer.write_u32::<LittleEndian>(channel.baudrate)?;
        writer.write_u32::<LittleEndian>(u32::from(channel.is_active))?;
        writer.write_u16::<LittleEndian>(channel.status)?;
    }

    Ok(())
}

fn header_io(source: io::Error) -> DecoderError {
    DecoderError::io(0, source)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    reader.read_u32::<LittleEndian>().map_err(header_io)
}

fn read_capture_time<R: Read>(reader: &mut R) -> io::Result<CaptureTime> {
    Ok(CaptureTime {
        year: reader.read_u16::<LittleEndian>()?,
        month: reader.read_u16::<LittleEndian>()?,
        day_of_week: reader.read_u16::<LittleEndian>()?,
        day: reader.read_u16::<LittleEndian>()?,
        hour: reader.read_u16::<LittleEndian>()?,
        minute: reader.read_u16::<LittleEndian>()?,
        second: reader.read_u16::<LittleEndian>()?,
        milliseconds: reader.read_u16::<LittleEndian>()?,
    })
}

fn read_os_version<R: Read>(reader: &mut R) -> io::Result<OsVersion> {
    let mut os = OsVersion {
        info_size: reader.read_u32::<LittleEndian>()?,
        major: reader.read_u32::<LittleEndian>()?,
        minor: reader.read_u32::<LittleEndian>()?,
        build: reader.read_u32::<LittleEndian>()?,
        platform_id: reader.read_u32::<LittleEndian>()?,
        csd_version: String::new(),
    };

    // All characters are consumed so the cursor stays aligned, only the part
    // before the first NUL is kept.
    let declared = os.csd_len();
    let mut raw = Vec::new();
    reader.by_ref().take(declared as u64).read_to_end(&mut raw)?;
    if raw.len() < declared {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("OS version string truncated ({} of {} bytes)", raw.len(), declared),
        ));
    }
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    os.csd_version = raw[..end].iter().map(|&b| char::from(b)).collect();

    Ok(os)
}

fn read_hardware_info<R: Read>(reader: &mut R) -> io::Result<HardwareInfo> {
    let mut hw = HardwareInfo {
        size: reader.read_u32::<LittleEndian>()?,
        handle: reader.read_u8()?,
        device_nr: reader.read_u8()?,
        serial_nr: reader.read_u32::<LittleEndian>()?,
        firmware_version: reader.read_u32::<LittleEndian>()?,
        product_code: reader.read_u32::<LittleEndian>()?,
        ext: None,
    };

    if hw.size > HW_INFO_EXTENDED_SIZE {
        let mut unique_id = [0u32; 4];
        reader.read_u32_into::<LittleEndian>(&mut unique_id)?;
        hw.ext = Some(HardwareInfoExt {
            unique_id,
            flags: reader.read_u32::<LittleEndian>()?,
        });
    }

    Ok(hw)
}

fn read_channel_info<R: Read>(reader: &mut R) -> io::Result<ChannelInfo> {
    Ok(ChannelInfo {
        size: reader.read_u32::<LittleEndian>()?,
        mode: reader.read_u8()?,
        btr0: reader.read_u8()?,
        btr1: reader.read_u8()?,
        ocr: reader.read_u8()?,
        acceptance_mask: reader.read_u32::<LittleEndian>()?,
        acceptance_code: reader.read_u32::<LittleEndian>()?,
        baudrate: reader.read_u32::<LittleEndian>()?,
        is_active: reader.read_u32::<LittleEndian>()? != 0,
        status: reader.read_u16::<LittleEndian>()?,
    })
}
