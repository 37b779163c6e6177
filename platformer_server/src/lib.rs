//! `platformer_server`
//!
//! Server-side systems:
//! - Fixed timestep simulation loop
//! - Connection handling and identity minting
//! - Input relay between clients
//! - Periodic position reconciliation (anti-cheat + liveness)
//!
//! Networking model: a single UDP socket on a well-known port. The listener
//! task hands decoded packets to the tick loop over a channel; no game state
//! is shared between the two.

pub mod authority;
pub mod reconcile;
pub mod server;

pub use server::GameServer;
