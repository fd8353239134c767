//! Radio device implementations
//!
//! The protocol tasks talk to the radio through a pair of frame queues; a
//! radio device task shuttles frames between those queues and an actual
//! transport. Two implementations ship with the library:
//!
//! - `echo`: loopback device that plays transmitted frames straight back,
//!   for single-node testing
//! - `simulator`: channel-backed device wired to an external network hub,
//!   with a configurable loss rate, for multi-node testing
//!
//! Hardware radio drivers live with the application: chip bring-up (channel
//! group, transmit power, pins) is an external collaborator concern.

#[cfg(feature = "radio-device-echo")]
pub mod echo;

#[cfg(feature = "radio-device-simulator")]
pub mod simulator;

// Re-export the active radio device implementation
#[cfg(feature = "radio-device-echo")]
pub use echo::{radio_device_task, RadioDevice};

#[cfg(feature = "radio-device-simulator")]
pub use simulator::{radio_device_task, RadioDevice};
