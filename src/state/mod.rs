//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `DriverState`: the pagination driver's lifecycle (init, first page, iterating, done, error)
//! - `StopSignal`: a shared flag checked before every fetch so a job can stop between pages

mod driver_state;
mod stop_signal;

// Re-export main types
pub use driver_state::DriverState;
pub use stop_signal::StopSignal;
