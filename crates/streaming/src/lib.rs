//! Priority-window streaming-read engine: steers an embedded BitTorrent
//! session's piece priorities ahead of a sequential reader and puts idle
//! sibling readers to sleep.

pub mod controller;
pub mod dormancy;
pub mod reader;
pub mod window;

pub use controller::WindowState;
pub use dormancy::DormancyRegistry;
pub use reader::PriorityStreamReader;
pub use window::{deprioritize_range, gradient_bands, initial_window, PriorityCall};
