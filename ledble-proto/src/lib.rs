//! ledble wire protocol - command types and packet encoding
//!
//! Every packet written to the light controller starts with [`MAGIC`], then the
//! [`CommandKind`] ordinal, then a fixed-size payload. There is no length
//! prefix, the firmware infers the length from the kind byte.

pub mod ble;
pub mod color;

pub use color::{ParseColorError, Rgb};

/// First byte of every packet
pub const MAGIC: u8 = 0x3C;

/// Encoded length of a `PowerToggle` packet
pub const POWER_TOGGLE_LEN: usize = 3;

/// Encoded length of a `SteadyColor` packet
pub const STEADY_COLOR_LEN: usize = 5;

/// Packet type tag. The ordinal is the second byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    SyncTime = 0,
    PowerToggle = 1,
    SteadyColor = 2,
    UniColor = 3,
    MultiColor = 4,
    Speed = 5,
    Timer = 6,
}

impl CommandKind {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::SyncTime),
            1 => Some(Self::PowerToggle),
            2 => Some(Self::SteadyColor),
            3 => Some(Self::UniColor),
            4 => Some(Self::MultiColor),
            5 => Some(Self::Speed),
            6 => Some(Self::Timer),
            _ => None,
        }
    }

    /// Fixed encoded length, or `None` for kinds with no payload shape yet
    pub fn encoded_len(self) -> Option<usize> {
        match self {
            Self::PowerToggle => Some(POWER_TOGGLE_LEN),
            Self::SteadyColor => Some(STEADY_COLOR_LEN),
            Self::SyncTime | Self::UniColor | Self::MultiColor | Self::Speed | Self::Timer => None,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// A semantic command for the light controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Turn the light on or off
    PowerToggle { on: bool },
    /// Set a single color. Channels are intensities in 0.0..=1.0; values
    /// outside the range are clamped when encoded.
    SteadyColor { red: f64, green: f64, blue: f64 },
    /// A kind the firmware reserves but that has no payload shape yet
    Reserved(CommandKind),
}

impl Command {
    pub fn power(on: bool) -> Self {
        Self::PowerToggle { on }
    }

    pub fn color(red: f64, green: f64, blue: f64) -> Self {
        Self::SteadyColor { red, green, blue }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::PowerToggle { .. } => CommandKind::PowerToggle,
            Self::SteadyColor { .. } => CommandKind::SteadyColor,
            Self::Reserved(kind) => *kind,
        }
    }
}

/// An encoded command, ready to be written to the control characteristic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    kind: CommandKind,
    bytes: Vec<u8>,
}

impl Packet {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("unsupported command: {0} has no payload format")]
    UnsupportedCommand(CommandKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty packet")]
    Empty,
    #[error("packet truncated to {0} byte(s)")]
    Truncated(usize),
    #[error("bad magic byte 0x{0:02x}, expected 0x3c")]
    BadMagic(u8),
    #[error("unknown command kind {0}")]
    UnknownKind(u8),
    #[error("unsupported command: {0}")]
    Unsupported(CommandKind),
    #[error("{kind} packet must be {expected} bytes, got {actual}")]
    Length {
        kind: CommandKind,
        expected: usize,
        actual: usize,
    },
    #[error("power flag must be 0 or 1, got {0}")]
    BadFlag(u8),
}

/// Map a normalized intensity to a channel byte.
///
/// Rounds half away from zero and clamps to 0..=255. NaN maps to 0.
pub fn channel_byte(value: f64) -> u8 {
    // `as` saturates and sends NaN to 0
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Encode a command into its wire form
pub fn encode(command: &Command) -> Result<Packet, EncodeError> {
    let bytes = match *command {
        Command::PowerToggle { on } => {
            vec![MAGIC, CommandKind::PowerToggle.ordinal(), u8::from(on)]
        }
        Command::SteadyColor { red, green, blue } => vec![
            MAGIC,
            CommandKind::SteadyColor.ordinal(),
            channel_byte(red),
            channel_byte(green),
            channel_byte(blue),
        ],
        Command::Reserved(kind) => return Err(EncodeError::UnsupportedCommand(kind)),
    };
    Ok(Packet {
        kind: command.kind(),
        bytes,
    })
}

/// Validate a packet and recover the command it encodes.
///
/// Color bytes come back as `byte / 255`, so re-encoding yields the same bytes.
pub fn decode(data: &[u8]) -> Result<Command, DecodeError> {
    let magic = *data.first().ok_or(DecodeError::Empty)?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }

    let ordinal = *data.get(1).ok_or(DecodeError::Truncated(data.len()))?;
    let kind = CommandKind::from_ordinal(ordinal).ok_or(DecodeError::UnknownKind(ordinal))?;
    let expected = kind.encoded_len().ok_or(DecodeError::Unsupported(kind))?;

    if data.len() != expected {
        return Err(DecodeError::Length {
            kind,
            expected,
            actual: data.len(),
        });
    }

    match kind {
        CommandKind::PowerToggle => match data[2] {
            0 => Ok(Command::power(false)),
            1 => Ok(Command::power(true)),
            other => Err(DecodeError::BadFlag(other)),
        },
        CommandKind::SteadyColor => Ok(Command::color(
            f64::from(data[2]) / 255.0,
            f64::from(data[3]) / 255.0,
            f64::from(data[4]) / 255.0,
        )),
        _ => Err(DecodeError::Unsupported(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_toggle() {
        for on in [true, false] {
            let packet = encode(&Command::power(on)).unwrap();
            assert_eq!(packet.as_bytes(), &[0x3C, 1, on as u8]);
            assert_eq!(packet.len(), POWER_TOGGLE_LEN);
            assert_eq!(packet.kind(), CommandKind::PowerToggle);
        }
    }

    #[test]
    fn steady_color() {
        let red = encode(&Command::color(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(red.as_bytes(), &[0x3C, 2, 255, 0, 0]);

        let black = encode(&Command::color(0.0, 0.0, 0.0)).unwrap();
        assert_eq!(black.as_bytes(), &[0x3C, 2, 0, 0, 0]);
        assert_eq!(black.len(), STEADY_COLOR_LEN);
    }

    #[test]
    fn channel_order_is_rgb() {
        let packet = encode(&Command::color(0.0, 0.2, 1.0)).unwrap();
        assert_eq!(packet.as_bytes(), &[0x3C, 2, 0, 51, 255]);
    }

    #[test]
    fn channel_rounding() {
        // 0.5 / 255 away from a whole byte rounds up
        assert_eq!(channel_byte(127.5 / 255.0), 128);
        assert_eq!(channel_byte(128.0 / 255.0), 128);
        assert_eq!(channel_byte(0.4 / 255.0), 0);
    }

    #[test]
    fn channel_clamps() {
        for value in [-100.0, -1.0, -0.0001, 1.0001, 2.0, 1e9, f64::INFINITY, f64::NEG_INFINITY] {
            let byte = channel_byte(value);
            assert!(byte == 0 || byte == 255, "{value} -> {byte}");
        }
        assert_eq!(channel_byte(-0.5), 0);
        assert_eq!(channel_byte(1.5), 255);
        assert_eq!(channel_byte(f64::NAN), 0);
    }

    #[test]
    fn reserved_kinds_are_rejected() {
        for kind in [
            CommandKind::SyncTime,
            CommandKind::UniColor,
            CommandKind::MultiColor,
            CommandKind::Speed,
            CommandKind::Timer,
        ] {
            assert_eq!(
                encode(&Command::Reserved(kind)),
                Err(EncodeError::UnsupportedCommand(kind))
            );
        }
    }

    #[test]
    fn ordinals() {
        for value in 0..=6 {
            assert_eq!(CommandKind::from_ordinal(value).unwrap().ordinal(), value);
        }
        assert_eq!(CommandKind::from_ordinal(7), None);
        assert_eq!(CommandKind::Timer.ordinal(), 6);
    }

    #[test]
    fn decode_validates() {
        assert_eq!(decode(&[]), Err(DecodeError::Empty));
        assert_eq!(decode(&[0x3D, 1, 1]), Err(DecodeError::BadMagic(0x3D)));
        assert_eq!(decode(&[0x3C]), Err(DecodeError::Truncated(1)));
        assert_eq!(decode(&[0x3C, 9, 1]), Err(DecodeError::UnknownKind(9)));
        assert_eq!(
            decode(&[0x3C, 0, 1, 2]),
            Err(DecodeError::Unsupported(CommandKind::SyncTime))
        );
        assert_eq!(
            decode(&[0x3C, 1]),
            Err(DecodeError::Length {
                kind: CommandKind::PowerToggle,
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            decode(&[0x3C, 2, 1, 2, 3, 4]),
            Err(DecodeError::Length {
                kind: CommandKind::SteadyColor,
                expected: 5,
                actual: 6
            })
        );
        assert_eq!(decode(&[0x3C, 1, 2]), Err(DecodeError::BadFlag(2)));
    }

    #[test]
    fn decode_inverts_encode() {
        assert_eq!(decode(&[0x3C, 1, 1]), Ok(Command::power(true)));

        let bytes = [0x3C, 2, 255, 128, 7];
        let command = decode(&bytes).unwrap();
        assert_eq!(encode(&command).unwrap().as_bytes(), &bytes);
    }
}
