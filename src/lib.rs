//! Tag the next version of a GitLab project and kick off its pipeline
//!
//! The crate is split into four layers:
//!
//! - [`cache`]: best-effort per-key JSON disk cache (identity lookups)
//! - [`gitlab`]: REST client and the session-authenticated pipeline trigger
//! - [`release`]: next-tag resolution and the release sequence
//! - [`config`]: preferences, directories, shared constants
//!
//! The binary in `main.rs` is thin glue over these.

pub mod cache;
pub mod config;
pub mod gitlab;
pub mod release;
