pub mod keys;
pub mod recording;
pub mod session;

pub use keys::{decode_key_owner, mint_private_key};
pub use recording::{RecordingManager, RecordingSlot};
pub use session::{SessionService, SessionSettings};
