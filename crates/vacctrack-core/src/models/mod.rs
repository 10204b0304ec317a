//! Domain models.

mod dose;
mod patient;
mod vaccine;

pub use dose::*;
pub use patient::*;
pub use vaccine::*;
