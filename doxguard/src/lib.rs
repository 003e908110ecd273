// doxguard/src/lib.rs
//! # doxguard CLI Application
//!
//! This crate provides the command-line front end for `doxguard-core`: scanning text,
//! managing exclusion rules, running the configuration guardian and computing
//! escalation decisions against a local data directory.

pub mod cli;
pub mod commands;
pub mod logger;
pub mod output;
