//! # botmeta-server
//!
//! HTTP host for botmeta: serves SwitchBot Bot operation mode and battery
//! queries from the advertisement cache in `botmeta-core`.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
