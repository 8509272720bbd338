//! Disk-pressure admission control: pauses non-focused torrent sessions
//! when free space drops too low and resumes them once it recovers.

pub mod controller;
pub mod probe;

pub use controller::{AdmissionConfig, AdmissionController};
pub use probe::DiskSpaceProbe;
