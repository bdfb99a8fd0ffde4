//! # Tick synchronization server
//!
//! The authoritative half of the protocol. The server owns the one true
//! entity position and a tick counter that advances exactly once per frame
//! at a fixed rate, no matter how many (or how few) client packets arrive.
//!
//! ## Per-input protocol
//!
//! For every input sample the server computes the client's drift
//! `server_tick + (W - 1) - client_tick` and stamps it as a signed
//! adjustment on its response, echoing the client's adjustment iteration so
//! the client can consume each correction exactly once. Samples for the
//! current tick or later are applied to the authoritative state and answered
//! with `Auth`; samples for ticks already passed are answered with `Null`.
//! Drift too large for an `i8` is logged and the sample dropped.
//!
//! ## Module Organization
//!
//! - `connection_manager`: per-connection bookkeeping and capacity limits
//! - `session`: the authoritative state machine run once per frame
//! - `network`: the fixed-rate runner binding a session to a transport
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::ProtocolConfig;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind("0.0.0.0:9053", ProtocolConfig::default(), 32).await?;
//!     server.run().await
//! }
//! ```

pub mod connection_manager;
pub mod network;
pub mod session;
