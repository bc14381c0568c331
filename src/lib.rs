//! Tracks how much time is spent on a single activity during each local calendar day.
//! Tracking is started and stopped from the terminal, totals survive crashes and are split at
//! local midnight.
//!

pub mod cli;
pub mod fs;
pub mod tracker;
pub mod utils;
