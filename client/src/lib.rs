//! # Client library
//!
//! A predicting client for the tick-synchronized protocol. Each frame the
//! client stamps its input with its current tick, sends it, and applies it
//! locally right away. Server responses then correct it in two ways:
//!
//! - **Reconciliation**: an authoritative position that disagrees with the
//!   prediction by more than the configured epsilon replaces it outright.
//! - **Tick adjustment**: a negative adjustment pauses tick advancement for
//!   that many frames, a positive one skips that many frame sleeps. Each
//!   adjustment is applied once, keyed by the adjustment iteration.
//!
//! ## Modules
//!
//! - `session`: the connection state machine and per-frame protocol logic,
//!   independent of any clock or socket
//! - `network`: the runner that paces frames and owns the transport
//! - `input`: input sources feeding one activation set per frame
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::input::IdleInput;
//! use client::network::Client;
//! use shared::ProtocolConfig;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:9053", ProtocolConfig::default(), IdleInput).await?;
//!     client.run().await
//! }
//! ```

pub mod input;
pub mod network;
pub mod session;
