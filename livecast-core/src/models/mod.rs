pub mod id;
pub mod recording;
pub mod session;

pub use id::{generate_public_id, ConnectionId, UserId};
pub use recording::HlsRecording;
pub use session::{
    CreateSessionRequest, CreatedSession, MediaKind, NewStreamSession, StreamSession, Transport,
};
