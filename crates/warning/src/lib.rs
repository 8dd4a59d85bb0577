//! Warning Controller
//!
//! Mediates transient violations into confirmed strikes: a violation first
//! arms a corrective warning with a grace period, and only escalates if it
//! is still present when the grace period runs out.

mod controller;

pub use controller::{WarningConfig, WarningController, WarningOutcome, WarningState};
