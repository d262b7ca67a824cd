//! Instrument identification and model ratings
//!
//! A DCS supply answers `*IDN?` with comma-separated fields:
//! manufacturer, model, serial number, firmware revision. Older firmware
//! pads fields with spaces and some units report a trailing status field.

use crate::error::ParseError;

/// Substrings that mark an identification line as coming from a DCS supply
pub const DEVICE_MARKERS: &[&str] = &["SORENSEN", "DCS"];

/// Parsed `*IDN?` response
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identity {
    /// Manufacturer field (e.g. `SORENSEN`)
    pub manufacturer: String,
    /// Model field (e.g. `DCS60-18E`)
    pub model: String,
    /// Serial number field
    pub serial_number: String,
    /// Firmware revision field
    pub firmware: String,
    /// The complete identification line, trimmed
    pub raw: String,
}

impl Identity {
    /// Split an identification line into its fields
    ///
    /// Never fails: missing fields are left empty so that unlabelled
    /// firmware still yields a usable identity.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let mut fields = raw.split(',').map(str::trim);
        let mut next = || fields.next().unwrap_or_default().to_string();

        Self {
            manufacturer: next(),
            model: next(),
            serial_number: next(),
            firmware: next(),
            raw: raw.to_string(),
        }
    }

    /// Ratings implied by the model designation, if it follows the DCS pattern
    pub fn ratings(&self) -> Option<Ratings> {
        Ratings::from_model(&self.model).ok()
    }

    /// Short label for display ("SORENSEN DCS60-18E")
    pub fn label(&self) -> String {
        match (self.manufacturer.is_empty(), self.model.is_empty()) {
            (false, false) => format!("{} {}", self.manufacturer, self.model),
            (false, true) => self.manufacturer.clone(),
            (true, false) => self.model.clone(),
            (true, true) => self.raw.clone(),
        }
    }
}

/// Check whether an identification line carries a DCS marker
///
/// Case-insensitive substring match against [`DEVICE_MARKERS`].
pub fn has_device_marker(identification: &str) -> bool {
    let upper = identification.to_ascii_uppercase();
    DEVICE_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Maximum programmable output of a supply
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ratings {
    /// Maximum output voltage in volts
    pub max_voltage: f64,
    /// Maximum output current in amperes
    pub max_current: f64,
}

impl Ratings {
    /// Parse a model designation such as `DCS60-18E` or `DCS8-125`
    ///
    /// The designation encodes rated volts and amps separated by a dash,
    /// optionally followed by a letter suffix for the interface option.
    pub fn from_model(model: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidModel(model.to_string());

        let trimmed = model.trim();
        let upper = trimmed.to_ascii_uppercase();
        let body = upper.strip_prefix("DCS").ok_or_else(invalid)?;
        let (volts, amps) = body.split_once('-').ok_or_else(invalid)?;

        let amps_end = amps
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(amps.len());

        let max_voltage = parse_rating(volts).ok_or_else(invalid)?;
        let max_current = parse_rating(&amps[..amps_end]).ok_or_else(invalid)?;

        Ok(Self {
            max_voltage,
            max_current,
        })
    }
}

fn parse_rating(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}
