//! Persistent elevation storage on top of `sled`.

pub mod elevation_db;
pub mod key;

pub use elevation_db::*;
pub use key::*;

pub use sled;
