use crate::error::{CookerError, Result};
use crate::models::Model;
use crate::types::DeviceStatus;
use bytes::{BufMut, Bytes, BytesMut};

/// First byte of every frame
pub const FRAME_PREFIX: u8 = 0x55;
/// Last byte of every frame
pub const FRAME_SUFFIX: u8 = 0xAA;

/// Command opcodes understood by the cooker firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Read firmware version
    GetVersion = 0x01,
    /// Start the selected program
    TurnOn = 0x03,
    /// Stop cooking and return to standby
    TurnOff = 0x04,
    /// Upload program parameters (temperature, timers, flags)
    SetMainProgram = 0x05,
    /// Read the 16-byte status record
    GetStatus = 0x06,
    /// Select a program slot
    SelectProgram = 0x09,
    /// Push the host clock to the device
    SyncTime = 0x6E,
    /// Read the device clock
    GetTime = 0x6F,
    /// Present the pairing key
    Auth = 0xFF,
}

impl Command {
    /// Wire opcode
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Opcode lookup, `None` for codes this crate does not speak
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::GetVersion),
            0x03 => Some(Self::TurnOn),
            0x04 => Some(Self::TurnOff),
            0x05 => Some(Self::SetMainProgram),
            0x06 => Some(Self::GetStatus),
            0x09 => Some(Self::SelectProgram),
            0x6E => Some(Self::SyncTime),
            0x6F => Some(Self::GetTime),
            0xFF => Some(Self::Auth),
            _ => None,
        }
    }
}

/// One decoded response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence counter echoed by the device
    pub seq: u8,
    /// Raw command byte (the device may answer with a different opcode
    /// than the one sent, so this is kept untyped here)
    pub command: u8,
    /// Payload between the command byte and the suffix
    pub payload: Vec<u8>,
}

/// Build an outgoing frame
#[must_use]
pub fn encode(seq: u8, command: Command, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 4);
    buf.put_u8(FRAME_PREFIX);
    buf.put_u8(seq);
    buf.put_u8(command.code());
    buf.put_slice(payload);
    buf.put_u8(FRAME_SUFFIX);
    buf.freeze()
}

/// Split an incoming notification into a [`Frame`]
///
/// # Errors
///
/// Returns [`CookerError::Framing`] when the buffer is shorter than the
/// minimal frame or the magic bytes are wrong.
pub fn decode(raw: &[u8]) -> Result<Frame> {
    if raw.len() < 4 {
        return Err(CookerError::Framing(format!(
            "frame too short: {} bytes",
            raw.len()
        )));
    }
    if raw[0] != FRAME_PREFIX {
        return Err(CookerError::Framing(format!(
            "bad prefix byte {:02X}",
            raw[0]
        )));
    }
    let last = raw[raw.len() - 1];
    if last != FRAME_SUFFIX {
        return Err(CookerError::Framing(format!("bad suffix byte {last:02X}")));
    }
    Ok(Frame {
        seq: raw[1],
        command: raw[2],
        payload: raw[3..raw.len() - 1].to_vec(),
    })
}

/// Decode a 16-byte status payload into a [`DeviceStatus`]
///
/// Layout is positional: program, sub-program, target temperature, main
/// timer h/m, additional timer h/m, auto-warm, status code, sound flag.
///
/// # Errors
///
/// [`CookerError::Protocol`] for short payloads,
/// [`CookerError::ProgramOutOfRange`] when the program byte is not in the
/// model's table.
pub fn parse_status(model: &Model, payload: &[u8]) -> Result<DeviceStatus> {
    if payload.len() < 16 {
        return Err(CookerError::Protocol(format!(
            "status payload too short: {} bytes",
            payload.len()
        )));
    }
    let program_id = payload[0];
    Ok(DeviceStatus {
        program_id,
        program: model.program(program_id)?,
        subprogram_id: payload[1],
        target_temperature: payload[2],
        main_hours: payload[3],
        main_minutes: payload[4],
        additional_hours: payload[5],
        additional_minutes: payload[6],
        auto_warm: payload[7] != 0,
        status: payload[8],
        sound_enabled: payload[9] != 0,
    })
}

/// Pack a clock value for [`Command::SyncTime`]
///
/// Two little-endian i32 values: unix seconds, then the local UTC offset
/// in seconds.
#[must_use]
pub fn encode_time(unix_secs: i32, tz_offset_secs: i32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&unix_secs.to_le_bytes());
    out[4..].copy_from_slice(&tz_offset_secs.to_le_bytes());
    out
}

/// Unpack a [`Command::GetTime`] payload into (unix seconds, UTC offset)
///
/// # Errors
///
/// [`CookerError::Protocol`] when the payload is not 8 bytes.
pub fn decode_time(payload: &[u8]) -> Result<(i32, i32)> {
    if payload.len() < 8 {
        return Err(CookerError::Protocol(format!(
            "time payload too short: {} bytes",
            payload.len()
        )));
    }
    let secs = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let offset = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    Ok((secs, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode(7, Command::SelectProgram, &[9, 0]);
        assert_eq!(&frame[..], &[0x55, 7, 0x09, 9, 0, 0xAA]);
    }

    #[test]
    fn test_round_trip() {
        let payload = [1, 2, 3, 4, 5];
        let raw = encode(42, Command::SetMainProgram, &payload);
        let frame = decode(&raw).unwrap();
        assert_eq!(frame.seq, 42);
        assert_eq!(frame.command, Command::SetMainProgram.code());
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let raw = encode(0, Command::GetStatus, &[]);
        assert_eq!(raw.len(), 4);
        let frame = decode(&raw).unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(&[0x55, 1]), Err(CookerError::Framing(_))));
        assert!(matches!(
            decode(&[0x54, 1, 2, 0xAA]),
            Err(CookerError::Framing(_))
        ));
        assert!(matches!(
            decode(&[0x55, 1, 2, 0xAB]),
            Err(CookerError::Framing(_))
        ));
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::Auth.code(), 0xFF);
        assert_eq!(Command::from_u8(0x06), Some(Command::GetStatus));
        assert_eq!(Command::from_u8(0x6E), Some(Command::SyncTime));
        assert_eq!(Command::from_u8(0x02), None);
    }

    #[test]
    fn test_parse_status() {
        let model = Model::resolve("RMC-M800S").unwrap();
        let payload = [9, 0, 99, 1, 0, 0, 30, 1, 0x05, 1, 0, 0, 0, 0, 0, 0];
        let status = parse_status(model, &payload).unwrap();
        assert_eq!(status.program_id, 9);
        assert_eq!(status.program, crate::models::Program::Soup);
        assert_eq!(status.target_temperature, 99);
        assert_eq!(status.main_hours, 1);
        assert_eq!(status.additional_minutes, 30);
        assert!(status.auto_warm);
        assert!(status.is_on());
        assert!(status.sound_enabled);
    }

    #[test]
    fn test_parse_status_too_short() {
        let model = Model::resolve("RMC-M800S").unwrap();
        assert!(matches!(
            parse_status(model, &[0; 10]),
            Err(CookerError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_status_unknown_program() {
        let model = Model::resolve("RMC-M800S").unwrap();
        let mut payload = [0u8; 16];
        payload[0] = 200;
        assert!(matches!(
            parse_status(model, &payload),
            Err(CookerError::ProgramOutOfRange { .. })
        ));
    }

    #[test]
    fn test_time_round_trip() {
        let raw = encode_time(1_700_000_000, 3 * 3600);
        let (secs, offset) = decode_time(&raw).unwrap();
        assert_eq!(secs, 1_700_000_000);
        assert_eq!(offset, 10800);

        let raw = encode_time(-1, -5 * 3600);
        let (secs, offset) = decode_time(&raw).unwrap();
        assert_eq!((secs, offset), (-1, -18000));
    }

    #[test]
    fn test_time_too_short() {
        assert!(matches!(
            decode_time(&[1, 2, 3]),
            Err(CookerError::Protocol(_))
        ));
    }
}
