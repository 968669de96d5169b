//! In-process adapters for the Gatehouse ports.
//!
//! The scheduling core only talks to the traits in `gatehouse_core::ports`;
//! this crate provides implementations that keep everything in memory, with
//! the same commit/rollback visibility rules a database-backed store has.

pub mod repositories;

pub use repositories::*;
