//! Terminal settings profiles
//!
//! A `TerminalSettings` value is everything needed to bring a terminal up:
//! the port, its line configuration, and the initial state of the control
//! lines. `LegacySettings` reads the flat preference keys that older session
//! files were written with.

use serde::{Deserialize, Serialize};

use super::LineConfig;

/// A saved terminal profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalSettings {
    /// Profile name (e.g., "Default", "Bench Supply")
    pub name: String,
    /// Serial port path, if one has been chosen
    #[serde(default)]
    pub port: Option<String>,
    /// Separate transmit port for split RX/TX setups
    #[serde(default)]
    pub output_port: Option<String>,
    pub line: LineConfig,
    /// Assert RTS after opening
    #[serde(default)]
    pub rts: bool,
    /// Assert DTR after opening
    #[serde(default)]
    pub dtr: bool,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            port: None,
            output_port: None,
            line: LineConfig::default(),
            rts: false,
            dtr: false,
        }
    }
}

/// Flat key/value form written by older versions, one key per setting.
#[derive(Debug, Deserialize)]
pub struct LegacySettings {
    #[serde(rename = "Terminal Serial Port", default)]
    pub port: Option<String>,
    #[serde(rename = "Terminal Baud Rate")]
    pub baud: u32,
    #[serde(rename = "Terminal Bits")]
    pub bits: u8,
    #[serde(rename = "Terminal Parity")]
    pub parity: u8,
    #[serde(rename = "Terminal Stop Bits")]
    pub stops: u8,
    #[serde(rename = "Terminal Send CRLF", default)]
    pub crlf: bool,
    #[serde(rename = "Terminal Raw", default)]
    pub raw: bool,
    #[serde(rename = "Terminal RTS", default)]
    pub rts: bool,
    #[serde(rename = "Terminal DTR", default)]
    pub dtr: bool,
}

impl LegacySettings {
    pub fn into_settings(self, name: &str) -> super::TerminalResult<TerminalSettings> {
        let line = LineConfig::from_raw(self.baud, self.bits, self.parity, self.stops)?
            .with_crlf(self.crlf)
            .with_raw(self.raw);
        Ok(TerminalSettings {
            name: name.to_string(),
            port: self.port,
            output_port: None,
            line,
            rts: self.rts,
            dtr: self.dtr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Parity;

    #[test]
    fn default_settings_have_sensible_values() {
        let settings = TerminalSettings::default();
        assert_eq!(settings.name, "Default");
        assert_eq!(settings.line.baud.as_u32(), 9600);
        assert!(settings.port.is_none());
        assert!(!settings.rts && !settings.dtr);
    }

    #[test]
    fn settings_serialize_to_json() {
        let settings = TerminalSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"name\":\"Default\""));
        assert!(json.contains("\"baud\":9600"));
    }

    #[test]
    fn legacy_keys_convert_to_settings() {
        let json = r#"{
            "Terminal Serial Port": "/dev/cu.usbserial",
            "Terminal Baud Rate": 4800,
            "Terminal Bits": 7,
            "Terminal Parity": 2,
            "Terminal Stop Bits": 1,
            "Terminal Send CRLF": true,
            "Terminal DTR": true
        }"#;
        let legacy: LegacySettings = serde_json::from_str(json).unwrap();
        let settings = legacy.into_settings("Imported").unwrap();
        assert_eq!(settings.port.as_deref(), Some("/dev/cu.usbserial"));
        assert_eq!(settings.line.baud.as_u32(), 4800);
        assert_eq!(settings.line.parity, Parity::Even);
        assert!(settings.line.crlf);
        assert!(!settings.line.raw);
        assert!(settings.dtr && !settings.rts);
    }

    #[test]
    fn legacy_settings_with_bad_baud_are_rejected() {
        let json = r#"{
            "Terminal Baud Rate": 1234,
            "Terminal Bits": 8,
            "Terminal Parity": 0,
            "Terminal Stop Bits": 1
        }"#;
        let legacy: LegacySettings = serde_json::from_str(json).unwrap();
        assert!(legacy.into_settings("Bad").is_err());
    }
}
