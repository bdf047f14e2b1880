//! sizediff command-line front end
//!
//! This crate provides:
//! - `diff`: the added/removed/changed report between two builds
//! - `tree`: the size tree of a build (or of a diff) loaded through the tree worker
//! - `sizereport.toml` configuration

pub mod cmd;
pub mod config;
pub mod report;
pub mod util;
