// LiveCast API Library
//
// HTTP surface of the live-stream core: session endpoints, HLS serving and
// the WebSocket signaling endpoint

pub mod http;

pub use http::{create_router, AppState};
