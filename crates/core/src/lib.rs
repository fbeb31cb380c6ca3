#![forbid(unsafe_code)]

//! Domain model for curriculum progression: the module catalog, per-user
//! progress records, and the transitions that keep them consistent.

pub mod error;
pub mod model;
pub mod time;

pub use error::Error;
pub use time::Clock;
