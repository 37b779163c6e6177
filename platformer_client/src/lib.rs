//! `platformer_client`
//!
//! Client-side systems:
//! - Connection management over a single UDP socket
//! - Input edge detection and redundant input sends
//! - Prediction of the local player and of remote players
//! - Authoritative corrections and position sync replies

pub mod client;
pub mod input;
pub mod session;

pub use client::GameClient;
