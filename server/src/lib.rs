//! # Potstop Game Server Library
//!
//! This library provides the authoritative server for Potstop, a multiplayer
//! word game where players race to fill category answers starting with a drawn
//! letter and the first valid STOP ends the round.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Session
//! The server owns the one game session: the join-ordered roster, every
//! player's score, the current round (number, letter, categories, phase) and
//! the answers collected for it. Clients only ever see the results of
//! decisions made here.
//!
//! ### The Stop Race
//! Several players may send STOP at nearly the same time. Exactly one of them
//! wins the Playing to Stopped transition and becomes the caller. The caller's
//! task gives in-flight answers a short grace period, tells every player still
//! missing answers who stopped the round, waits a bounded time for them, and
//! scores the round once. Every other STOP waits for that scoring pass and
//! receives the same ranking.
//!
//! ### Client Management
//! Handles the complete lifecycle of client connections:
//! - Connection registration and player name binding on JOIN
//! - Per-connection outbound queues shared by responses and pushes
//! - Disconnection handling, treated as an implicit QUIT
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! The acceptor spawns one worker per TCP connection. The worker reads frames
//! and dispatches them in order; a paired writer task drains the connection's
//! outbound queue. Slow operations (the delayed round broadcast, answer
//! collection, waiting for the ranking) run on their own spawned tasks so the
//! worker keeps reading.
//!
//! ### Single Session Lock
//! Every read-modify-write on the session happens under one mutex. Phase and
//! pending-answer changes are published on a watch channel, so waits are
//! wakeups with a timeout rather than polling loops.
//!
//! ## Module Organization
//!
//! - `config`: tunables, timings and the category pools
//! - `roster`: join-ordered player names, head is the leader
//! - `scoring`: answer validation, uniqueness scoring, letter and category draws
//! - `game`: the `GameSession` state machine
//! - `client_manager`: registry of live connections and broadcast targets
//! - `dispatcher`: command routing, the stop race and answer collection
//! - `network`: TCP acceptor, connection workers and shutdown
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("127.0.0.1:8888", ServerConfig::default()).await?;
//!     let shutdown = server.shutdown_handle();
//!
//!     tokio::select! {
//!         result = server.run() => result?,
//!         _ = tokio::signal::ctrl_c() => shutdown.shutdown().await,
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod dispatcher;
pub mod game;
pub mod network;
pub mod roster;
pub mod scoring;
