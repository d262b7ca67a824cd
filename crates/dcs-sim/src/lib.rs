//! Sorensen DCS Simulation Library
//!
//! This crate provides a simulated DCS supply for exercising drivers and the
//! desktop front end without physical hardware. It includes:
//!
//! - **VirtualSupply**: answers the SCPI dialect and models a resistive load
//! - **run_virtual_supply_task**: serves a `VirtualSupply` over any async stream
//!
//! # Example
//!
//! ```rust
//! use dcs_sim::VirtualSupply;
//!
//! let mut supply = VirtualSupply::with_model("DCS60-18E");
//! supply.handle_line("SOUR:VOLT 12");
//! supply.handle_line("SOUR:CURR 5");
//!
//! assert_eq!(supply.handle_line("MEAS:VOLT?").as_deref(), Some("12.000"));
//! ```

pub mod supply;
pub mod task;

pub use supply::{
    RegulationMode, VirtualSupply, VirtualSupplyConfig, VirtualSupplyState, RECEIVED_HISTORY,
};
pub use task::{run_virtual_supply_task, VirtualSupplyCommand};
