pub mod domain;
pub mod telemetry;

pub use domain::{FilterMap, Machine, MachineName};
