//! Ambient service concerns shared by every crate in the workspace:
//! command line / environment configuration and console logging.

pub mod config;
pub mod logging;

pub use config::Config;
