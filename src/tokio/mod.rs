//! Tokio integration.
//!
//! The cursor API is blocking; this module lets async transport code feed it.

mod bridge;

pub use bridge::{PartSender, part_channel, scan_channel};
