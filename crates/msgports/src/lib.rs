//! Ordered postMessage delivery with transferable message ports.
//!
//! A message may carry ports whose channel is still being set up. msgports
//! holds such a message, and everything posted after it, until the ports have
//! identities, so the receiver always sees messages in the order they were
//! posted.
//!
//! # Crate Structure
//!
//! - [`port`]: entangled message ports and the registry that assigns identities
//! - [`sender`]: the ordered sender, its queue, and delivery targets
//! - [`wire`]: length-prefixed frames for resolved messages (behind `wire` feature)

/// Re-export port types.
pub mod port {
    pub use msgports_port::*;
}

/// Re-export sender types.
pub mod sender {
    pub use msgports_sender::*;
}

/// Re-export wire types (requires `wire` feature).
#[cfg(feature = "wire")]
pub mod wire {
    pub use msgports_wire::*;
}
