//! Color values accepted by the `SteadyColor` command

use crate::Command;

/// Normalized RGB triple, each channel in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseColorError {
    #[error("hex color must be 6 digits, got {0:?}")]
    Length(String),
    #[error("invalid hex digit in {0:?}")]
    Digit(String),
}

impl Rgb {
    pub fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }

    /// Parse `rrggbb` (an optional leading `#` is accepted)
    pub fn from_hex(input: &str) -> Result<Self, ParseColorError> {
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);

        if hex.len() != 6 {
            return Err(ParseColorError::Length(input.to_string()));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseColorError::Digit(input.to_string()));
        }

        let channel = |i: usize| -> Result<f64, ParseColorError> {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map(|byte| f64::from(byte) / 255.0)
                .map_err(|_| ParseColorError::Digit(input.to_string()))
        };

        Ok(Self {
            red: channel(0)?,
            green: channel(2)?,
            blue: channel(4)?,
        })
    }

    /// Convert hue, saturation and value (all 0.0..=1.0) to RGB
    pub fn from_hsv(hue: f64, saturation: f64, value: f64) -> Self {
        let sector = (hue * 6.0).floor();
        let f = hue * 6.0 - sector;
        let p = value * (1.0 - saturation);
        let q = value * (1.0 - f * saturation);
        let t = value * (1.0 - (1.0 - f) * saturation);

        let (red, green, blue) = match (sector as i64).rem_euclid(6) {
            0 => (value, t, p),
            1 => (q, value, p),
            2 => (p, value, t),
            3 => (p, q, value),
            4 => (t, p, value),
            _ => (value, p, q),
        };
        Self { red, green, blue }
    }

    pub fn into_command(self) -> Command {
        Command::SteadyColor {
            red: self.red,
            green: self.green,
            blue: self.blue,
        }
    }
}

impl std::str::FromStr for Rgb {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<Rgb> for Command {
    fn from(rgb: Rgb) -> Self {
        rgb.into_command()
    }
}
