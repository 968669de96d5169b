//! Gatehouse Core
//!
//! Domain types, ports, and error handling for the Gatehouse trigger and
//! admission subsystem. This crate has minimal dependencies and defines the
//! shared vocabulary used by the scheduler and its adapters.

pub mod build_cause;
pub mod clock;
pub mod error;
pub mod health;
pub mod ids;
pub mod pipeline;
pub mod ports;
pub mod run;
pub mod transaction;

pub use error::{Error, Result};
pub use ids::*;
