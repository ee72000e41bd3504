//! Stacks application library
//!
//! Domain modules for books, users and genres, plus the boot sequence that
//! wires them into the kernel registry and HTTP server.

pub mod bootstrap;
pub mod modules;
pub mod utils;

pub use bootstrap::App;
