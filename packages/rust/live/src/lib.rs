//! HTTP and websocket server: live audio sessions, batch NDJSON streaming,
//! and the conversation index API.

pub mod asr;
pub mod frames;
pub mod http;
pub mod server;
pub mod session;

pub use server::{router, serve, AppState};
