//! # ANARI Cycles Core
//!
//! Foundation types shared by the ANARI Cycles device: math aliases and
//! bounds, ANARI data type tags with element conversion, the
//! generation-checked arena backing every object table, and change stamps.

pub mod arena;
pub mod data_type;
pub mod math;
pub mod timestamp;

pub use arena::{Arena, Handle};
pub use data_type::DataType;
pub use timestamp::{Clock, TimeStamp};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core library version.
pub fn init() {
    log::info!("ANARI Cycles Core v{} initialized", VERSION);
}
