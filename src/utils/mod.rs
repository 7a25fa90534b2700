//! Utility helpers: generational arenas, math extensions, logging and profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, ArenaKey, GenerationalId};
pub use math::*;
