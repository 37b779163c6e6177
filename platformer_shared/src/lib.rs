//! `platformer_shared`
//!
//! Shared libraries used by both the platformer client and server.
//!
//! - `packet`: fixed-layout wire codec and player identities.
//! - `net`: UDP listener task and fire-and-forget sends.
//! - `physics`, `level`, `ecs`, `math`: the simulation pieces both sides run.
//! - `config`: session tuning.

pub mod config;
pub mod ecs;
pub mod level;
pub mod math;
pub mod net;
pub mod packet;
pub mod physics;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::ecs::*;
    pub use crate::level::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::packet::*;
    pub use crate::physics::*;
}
