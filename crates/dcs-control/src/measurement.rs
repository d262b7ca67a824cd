//! Output readings

use std::fmt;

use chrono::{DateTime, Local};

/// A programmable output quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Voltage,
    Current,
}

impl Quantity {
    /// SI unit symbol
    pub fn unit(&self) -> &'static str {
        match self {
            Quantity::Voltage => "V",
            Quantity::Current => "A",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Voltage => write!(f, "voltage"),
            Quantity::Current => write!(f, "current"),
        }
    }
}

/// One voltage/current sample taken from the output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Local time the sample was completed
    pub timestamp: DateTime<Local>,
    /// Output voltage in volts
    pub voltage: f64,
    /// Output current in amperes
    pub current: f64,
}

impl Measurement {
    /// A sample stamped with the current local time
    pub fn now(voltage: f64, current: f64) -> Self {
        Self {
            timestamp: Local::now(),
            voltage,
            current,
        }
    }
}
