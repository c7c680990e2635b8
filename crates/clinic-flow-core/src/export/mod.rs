//! Export of daily attendance.

mod attendance;

pub use attendance::*;
