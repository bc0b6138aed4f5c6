//! Async SeedLink 4 client harness.
//!
//! [`Consumer`] negotiates a subscription and receives records, [`Feeder`]
//! authenticates and publishes records with `FEED`, and [`relay`] copies one
//! into the other.

mod connection;
pub mod consumer;
pub mod error;
pub mod feeder;
pub mod relay;
pub mod state;
pub mod stream;

#[cfg(test)]
mod mock;

pub use consumer::Consumer;
pub use error::{ClientError, Result};
pub use feeder::Feeder;
pub use relay::{RelayOptions, relay};
pub use state::{ClientConfig, ClientState, ServerInfo};
pub use stream::record_stream;
