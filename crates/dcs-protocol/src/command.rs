//! SCPI commands understood by DCS-series supplies
//!
//! The DCS remote interface accepts short-form SCPI mnemonics terminated by a
//! carriage return. Queries end in `?` and produce exactly one response line
//! terminated by a newline.
//!
//! # Command Set
//! - `*IDN?` - Identification (`SORENSEN,DCS60-18E,1234A5678,1.06`)
//! - `*CLS` - Clear status and error queue
//! - `MEAS:VOLT?` / `MEAS:CURR?` - Measured output
//! - `SOUR:VOLT <v>` / `SOUR:CURR <a>` - Program setpoints
//! - `SOUR:VOLT?` / `SOUR:CURR?` - Read back setpoints
//! - `SOUR:VOLT? MAX` / `SOUR:CURR? MAX` - Programmable limits
//! - `SYST:LOCAL` - Return front panel control

use crate::error::ParseError;
use crate::{EncodeCommand, COMMAND_TERMINATOR};

/// A DCS SCPI command
#[derive(Debug, Clone, PartialEq)]
pub enum ScpiCommand {
    /// `*IDN?`
    Identify,
    /// `*CLS`
    ClearStatus,
    /// `MEAS:VOLT?`
    MeasureVoltage,
    /// `MEAS:CURR?`
    MeasureCurrent,
    /// `SOUR:VOLT <volts>`
    SetVoltage(f64),
    /// `SOUR:CURR <amps>`
    SetCurrent(f64),
    /// `SOUR:VOLT?`
    VoltageSetpoint,
    /// `SOUR:CURR?`
    CurrentSetpoint,
    /// `SOUR:VOLT? MAX`
    MaxVoltage,
    /// `SOUR:CURR? MAX`
    MaxCurrent,
    /// `SYST:LOCAL`
    ReturnToLocal,
}

impl ScpiCommand {
    /// The mnemonic text of this command, without terminator
    pub fn text(&self) -> String {
        match self {
            ScpiCommand::Identify => "*IDN?".to_string(),
            ScpiCommand::ClearStatus => "*CLS".to_string(),
            ScpiCommand::MeasureVoltage => "MEAS:VOLT?".to_string(),
            ScpiCommand::MeasureCurrent => "MEAS:CURR?".to_string(),
            ScpiCommand::SetVoltage(v) => format!("SOUR:VOLT {:.3}", v),
            ScpiCommand::SetCurrent(a) => format!("SOUR:CURR {:.3}", a),
            ScpiCommand::VoltageSetpoint => "SOUR:VOLT?".to_string(),
            ScpiCommand::CurrentSetpoint => "SOUR:CURR?".to_string(),
            ScpiCommand::MaxVoltage => "SOUR:VOLT? MAX".to_string(),
            ScpiCommand::MaxCurrent => "SOUR:CURR? MAX".to_string(),
            ScpiCommand::ReturnToLocal => "SYST:LOCAL".to_string(),
        }
    }

    /// Whether the instrument answers this command with a response line
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            ScpiCommand::Identify
                | ScpiCommand::MeasureVoltage
                | ScpiCommand::MeasureCurrent
                | ScpiCommand::VoltageSetpoint
                | ScpiCommand::CurrentSetpoint
                | ScpiCommand::MaxVoltage
                | ScpiCommand::MaxCurrent
        )
    }

    /// Parse a command line as received by an instrument
    ///
    /// Mnemonics are case-insensitive and both short (`SOUR:VOLT`) and long
    /// (`SOURCE:VOLTAGE`) forms are accepted.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (header, param) = match line.split_once(char::is_whitespace) {
            Some((h, p)) => (h, Some(p.trim())),
            None => (line, None),
        };
        let header = normalize_header(header);

        match (header.as_str(), param) {
            ("*IDN?", None) => Ok(ScpiCommand::Identify),
            ("*CLS", None) => Ok(ScpiCommand::ClearStatus),
            ("MEAS:VOLT?", None) => Ok(ScpiCommand::MeasureVoltage),
            ("MEAS:CURR?", None) => Ok(ScpiCommand::MeasureCurrent),
            ("SOUR:VOLT?", None) => Ok(ScpiCommand::VoltageSetpoint),
            ("SOUR:CURR?", None) => Ok(ScpiCommand::CurrentSetpoint),
            ("SOUR:VOLT?", Some(p)) if p.eq_ignore_ascii_case("MAX") => {
                Ok(ScpiCommand::MaxVoltage)
            }
            ("SOUR:CURR?", Some(p)) if p.eq_ignore_ascii_case("MAX") => {
                Ok(ScpiCommand::MaxCurrent)
            }
            ("SOUR:VOLT", Some(p)) => parse_value(p).map(ScpiCommand::SetVoltage),
            ("SOUR:CURR", Some(p)) => parse_value(p).map(ScpiCommand::SetCurrent),
            ("SYST:LOCAL", _) => Ok(ScpiCommand::ReturnToLocal),
            _ => Err(ParseError::UnknownCommand(line.to_string())),
        }
    }
}

impl EncodeCommand for ScpiCommand {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = self.text().into_bytes();
        bytes.push(COMMAND_TERMINATOR);
        bytes
    }
}

/// Collapse long-form mnemonics to their short form and uppercase them
fn normalize_header(header: &str) -> String {
    header
        .to_ascii_uppercase()
        .split(':')
        .map(|node| match node {
            "MEASURE" => "MEAS",
            "SOURCE" => "SOUR",
            "VOLTAGE" => "VOLT",
            "VOLTAGE?" => "VOLT?",
            "CURRENT" => "CURR",
            "CURRENT?" => "CURR?",
            "SYSTEM" => "SYST",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(":")
}

fn parse_value(param: &str) -> Result<f64, ParseError> {
    param
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber(param.to_string()))
}
