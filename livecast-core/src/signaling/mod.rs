//! WebRTC signaling for peer-relay streams
//!
//! One host and any number of viewers per stream. The relay only brokers the
//! offer/answer/ICE exchange and chat; media never passes through here.

mod message;
mod registry;
mod relay;

pub use message::{ClientMessage, ServerMessage};
pub use registry::{ConnectionStreams, RegistryEntry, RegistryStats, StreamRegistry, ViewerJoin};
pub use relay::{RelayStats, SignalingRelay};
