#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub use sigv4_proxy_core::*;

mod context;
pub use context::default_context;

pub mod aws;
pub mod config;
pub use config::{Args, Config};

pub mod transport;
pub use transport::SigningTransport;

pub mod relay;
pub use relay::Relay;
