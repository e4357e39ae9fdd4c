//! # Potstop Client Library
//!
//! A thin async client for the Potstop game server. It speaks the line-framed
//! protocol from the `shared` crate and exposes one method per command.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Connection handling and request/response matching:
//! - Connecting, with an optional bounded retry loop
//! - Sending commands and waiting for their response with a timeout
//! - Receiving unsolicited pushes (round start, stop notices, shutdown)
//!
//! ### Console Module (`console`)
//! Helpers for the line-mode binary: parsing typed commands and formatting
//! responses, rankings and pushes for a terminal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect_with_retry("127.0.0.1:8888", 5, Duration::from_secs(1)).await?;
//!
//!     let joined = client.join("mari").await?;
//!     println!("{} {}", joined.code.value(), joined.code.text());
//!
//!     let push = client.next_push(Duration::from_secs(60)).await?;
//!     println!("{:?}", push);
//!
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```

pub mod console;
pub mod network;
