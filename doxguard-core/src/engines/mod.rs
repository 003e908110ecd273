// doxguard-core/src/engines/mod.rs
//! Detection engine implementations.
//!
//! Each engine lives in its own file and implements the `DetectionEngine` trait.
//! `fast_path` is not an engine: it is a regex-free identifier check that the
//! guardian uses to cross-check the exception store.
//!
//! License: MIT OR APACHE 2.0

pub mod fast_path;
pub mod regex_engine;
