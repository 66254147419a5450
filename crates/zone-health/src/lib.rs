#![warn(clippy::pedantic)]
// Don't care enough to fix
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::wildcard_imports)]

pub mod checks;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod identify;
pub mod net;
pub mod query;
pub mod registry;
pub mod report;
pub mod transport;
#[cfg(feature = "clock-skew")]
pub mod tsig;
pub mod zone;

#[cfg(test)]
mod test_util;

pub use self::engine::{check_zone, check_zone_at, unix_now};
