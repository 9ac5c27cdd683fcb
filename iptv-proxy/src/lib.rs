//! iptv-proxy library crate.
//!
//! Republishes an upstream M3U playlist and XMLTV guide scoped to a single
//! channel, with a two-level conditional-GET cache in front of the origin.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod healthcheck;
pub mod logging;
pub mod proxy;
pub mod upstream;

pub use error::{Error, Result};
