//! # Pong Server Library
//!
//! This library provides the authoritative server for networked Pong matches.
//! It owns every live match, simulates it at a fixed tick rate, broadcasts the
//! resulting state to the two players, and hands finished results to storage.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Clients only send key changes. Ball flight, wall and paddle collisions,
//! and scoring all happen here, so no client can move the ball or the
//! opponent's paddle.
//!
//! ### Session Lifecycle
//! Players are paired first come, first served. A session starts `pending`,
//! runs once an opponent joins (or immediately against the computer), and
//! ends `finished` at eleven points or `aborted` when a player leaves.
//! Only finished matches between two people are recorded.
//!
//! ### State Broadcasting
//! After every tick the state of each running match is sent to its players.
//!
//! ## Module Organization
//!
//! ### Simulation (`geometry`, `arena`, `paddle`, `ball`, `score`, `game`)
//! - Segment intersection in the 100x100 percentage field
//! - Walls, paddles and the swept-path ball solver that cannot tunnel
//! - Point scoring past the overscan margin and match termination
//! - The per-match engine tying them to a single shared state
//!
//! ### Session Manager Module (`session_manager`)
//! Creates, pairs, cancels, aborts and expires sessions, ticks the running
//! ones, and emits match records.
//!
//! ### Store Module (`store`)
//! The recorder task and the storage backends it writes to.
//!
//! ### Client Manager Module (`client_manager`)
//! Maps player identities to UDP addresses, enforces capacity and detects
//! silent clients.
//!
//! ### Network Module (`network`)
//! UDP socket handling, the packet protocol and the main event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use server::store::{spawn_recorder, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let (recorder, _store) = spawn_recorder(MemoryStore::new());
//!
//!     // 60Hz ticks, 64 players, 5s client timeout
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default(), recorder).await?;
//!
//!     // Runs until shut down:
//!     // - Receives connections, matchmaking requests and key changes
//!     // - Advances every running match once per tick
//!     // - Broadcasts match state to the players
//!     // - Drops silent clients and stale pending games
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Resolves players to addresses and sends queued packets
//! - **Timeout Checker**: Removes inactive clients and triggers housekeeping
//! - **Main Loop**: Applies packets, ticks the sessions and queues broadcasts

pub mod arena;
pub mod ball;
pub mod client_manager;
pub mod game;
pub mod geometry;
pub mod network;
pub mod paddle;
pub mod score;
pub mod session_manager;
pub mod store;
pub mod utils;
