// doxguard/src/commands/mod.rs
//! Command handlers. Each returns `Ok(true)` when the process should exit with a
//! failure code even though the command itself ran.

pub mod decide;
pub mod guardian;
pub mod rules;
pub mod scan;
