//! CLI command implementations.

pub mod drivers;
pub mod run;
pub mod validate;
