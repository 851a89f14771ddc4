//! A library and application for driving the debug port of [Foenix] retro
//! computers.
//!
//! The debug port gives a host direct access to the memory, flash and CPU of
//! the C256, F256 and A2560 families over a serial link (or a TCP relay in
//! front of one). This crate implements its wire protocol, the flash
//! programming workflows built on top of it, and loaders for the executable
//! formats used on these machines.
//!
//! ## As an application
//!
//! [foenixmgr] can be installed using `cargo install`:
//!
//! ```bash
//! $ cargo install foenixmgr
//! ```
//!
//! ## As a library
//!
//! foenixmgr can be used as a library in other applications:
//!
//! ```toml
//! foenixmgr = { version = "0.1", default-features = false }
//! ```
//!
//! `default-features = false` is required to exclude the command-line
//! application and its dependencies. Enable the `serialport` feature to open
//! serial devices.
//!
//! [Foenix]: https://c256foenix.com
//! [foenixmgr]: https://crates.io/crates/foenixmgr

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_debug_implementations, rust_2018_idioms)]

pub use self::error::Error;

pub mod alignment;
#[cfg(feature = "cli")]
#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
pub mod cli;
pub mod connection;
pub mod error;
pub mod flasher;
pub mod loader;
#[cfg(feature = "cli")]
#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
pub mod logging;
pub mod relay;
pub mod run_state;
pub mod session;
pub mod target;
pub mod vectors;
