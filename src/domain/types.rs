//! Core domain types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{TerminalError, TerminalResult};

/// Raw OS handle behind an open connection (a file descriptor on Unix,
/// a `HANDLE` on Windows), widened so both fit.
pub type RawDescriptor = i64;

/// Baud rates offered by the terminal.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 28800, 38400, 57600, 115200, 230400,
];

/// A baud rate from [`SUPPORTED_BAUD_RATES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BaudRate(u32);

impl BaudRate {
    pub const B9600: BaudRate = BaudRate(9600);

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Every supported rate, slowest first.
    pub fn all() -> impl Iterator<Item = BaudRate> {
        SUPPORTED_BAUD_RATES.iter().map(|&b| BaudRate(b))
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = TerminalError;

    fn try_from(baud: u32) -> TerminalResult<Self> {
        if SUPPORTED_BAUD_RATES.contains(&baud) {
            Ok(BaudRate(baud))
        } else {
            Err(TerminalError::Config(format!("Unsupported baud rate: {baud}")))
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(baud: BaudRate) -> u32 {
        baud.0
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BaudRate {
    type Err = TerminalError;

    fn from_str(s: &str) -> TerminalResult<Self> {
        let baud: u32 = s
            .trim()
            .parse()
            .map_err(|_| TerminalError::Config(format!("Invalid baud rate: {s}")))?;
        BaudRate::try_from(baud)
    }
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub const ALL: [DataBits; 4] = [DataBits::Five, DataBits::Six, DataBits::Seven, DataBits::Eight];
}

impl TryFrom<u8> for DataBits {
    type Error = TerminalError;

    fn try_from(bits: u8) -> TerminalResult<Self> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            _ => Err(TerminalError::Config(format!("Unsupported data bits: {bits}"))),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> u8 {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl FromStr for DataBits {
    type Err = TerminalError;

    fn from_str(s: &str) -> TerminalResult<Self> {
        let bits: u8 = s
            .trim()
            .parse()
            .map_err(|_| TerminalError::Config(format!("Invalid data bits: {s}")))?;
        DataBits::try_from(bits)
    }
}

/// Parity checking mode.
///
/// The numeric form (0 = none, 1 = odd, 2 = even) matches the values older
/// preference files store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Parity {
    pub const ALL: [Parity; 3] = [Parity::None, Parity::Odd, Parity::Even];
}

impl TryFrom<u8> for Parity {
    type Error = TerminalError;

    fn try_from(parity: u8) -> TerminalResult<Self> {
        match parity {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            _ => Err(TerminalError::Config(format!("Unsupported parity: {parity}"))),
        }
    }
}

impl From<Parity> for u8 {
    fn from(parity: Parity) -> u8 {
        match parity {
            Parity::None => 0,
            Parity::Odd => 1,
            Parity::Even => 2,
        }
    }
}

impl FromStr for Parity {
    type Err = TerminalError;

    fn from_str(s: &str) -> TerminalResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "n" | "0" => Ok(Parity::None),
            "odd" | "o" | "1" => Ok(Parity::Odd),
            "even" | "e" | "2" => Ok(Parity::Even),
            _ => Err(TerminalError::Config(format!("Invalid parity: {s}"))),
        }
    }
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    pub const ALL: [StopBits; 2] = [StopBits::One, StopBits::Two];
}

impl TryFrom<u8> for StopBits {
    type Error = TerminalError;

    fn try_from(stops: u8) -> TerminalResult<Self> {
        match stops {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            _ => Err(TerminalError::Config(format!("Unsupported stop bits: {stops}"))),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(stops: StopBits) -> u8 {
        match stops {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl FromStr for StopBits {
    type Err = TerminalError;

    fn from_str(s: &str) -> TerminalResult<Self> {
        let stops: u8 = s
            .trim()
            .parse()
            .map_err(|_| TerminalError::Config(format!("Invalid stop bits: {s}")))?;
        StopBits::try_from(stops)
    }
}

/// Line configuration applied to a connection at open time.
///
/// `crlf` and `raw` do not touch the device; they select the outbound
/// newline translation and the inbound decoding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineConfig {
    pub baud: BaudRate,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    #[serde(default)]
    pub crlf: bool,
    #[serde(default)]
    pub raw: bool,
}

impl LineConfig {
    /// Build from the integer form used by older callers
    /// (`baud`, `bits`, `parity`, `stops`).
    pub fn from_raw(baud: u32, bits: u8, parity: u8, stops: u8) -> TerminalResult<Self> {
        Ok(Self {
            baud: BaudRate::try_from(baud)?,
            data_bits: DataBits::try_from(bits)?,
            parity: Parity::try_from(parity)?,
            stop_bits: StopBits::try_from(stops)?,
            crlf: false,
            raw: false,
        })
    }

    pub fn with_crlf(mut self, crlf: bool) -> Self {
        self.crlf = crlf;
        self
    }

    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }
}

impl Default for LineConfig {
    /// 9600 8N1, no translation
    fn default() -> Self {
        Self {
            baud: BaudRate::B9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            crlf: false,
            raw: false,
        }
    }
}

impl fmt::Display for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(
            f,
            "{} {}{}{}",
            self.baud,
            u8::from(self.data_bits),
            parity,
            u8::from(self.stop_bits)
        )
    }
}

/// Which direction a connection serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Input,
    Output,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Input => f.write_str("input"),
            Role::Output => f.write_str("output"),
        }
    }
}

/// Modem control (RTS, DTR) and status (CTS, DSR) lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemLines {
    pub rts: bool,
    pub dtr: bool,
    pub cts: bool,
    pub dsr: bool,
}

/// Information about a serial port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub name: String,
    pub port_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rate_accepts_only_supported_values() {
        assert_eq!(BaudRate::try_from(115200).unwrap().as_u32(), 115200);
        assert!(BaudRate::try_from(110).is_err());
        assert!(BaudRate::try_from(250000).is_err());
        assert_eq!(BaudRate::all().count(), SUPPORTED_BAUD_RATES.len());
    }

    #[test]
    fn parity_numeric_form_round_trips() {
        for parity in Parity::ALL {
            assert_eq!(Parity::try_from(u8::from(parity)).unwrap(), parity);
        }
        assert!(Parity::try_from(3).is_err());
    }

    #[test]
    fn parity_parses_names_and_letters() {
        assert_eq!("even".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("O".parse::<Parity>().unwrap(), Parity::Odd);
        assert_eq!(" none ".parse::<Parity>().unwrap(), Parity::None);
        assert!("mark".parse::<Parity>().is_err());
    }

    #[test]
    fn data_bits_reject_out_of_range() {
        assert!(DataBits::try_from(4).is_err());
        assert!(DataBits::try_from(9).is_err());
        assert_eq!("7".parse::<DataBits>().unwrap(), DataBits::Seven);
    }

    #[test]
    fn from_raw_validates_every_field() {
        let config = LineConfig::from_raw(19200, 7, 2, 2).unwrap();
        assert_eq!(config.baud.as_u32(), 19200);
        assert_eq!(config.data_bits, DataBits::Seven);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert!(!config.crlf && !config.raw);

        assert!(LineConfig::from_raw(19200, 7, 2, 3).is_err());
    }

    #[test]
    fn line_config_displays_short_form() {
        let config = LineConfig::default();
        assert_eq!(config.to_string(), "9600 8N1");
    }

    #[test]
    fn line_config_deserializes_numeric_fields() {
        let json = r#"{"baud":57600,"data_bits":8,"parity":1,"stop_bits":1}"#;
        let config: LineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.baud.as_u32(), 57600);
        assert_eq!(config.parity, Parity::Odd);
        assert!(!config.crlf);

        let bad = r#"{"baud":12345,"data_bits":8,"parity":0,"stop_bits":1}"#;
        assert!(serde_json::from_str::<LineConfig>(bad).is_err());
    }
}
