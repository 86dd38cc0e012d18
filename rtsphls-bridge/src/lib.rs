//! # RTSP HLS Bridge
//!
//! The player bridge contract and its transports. [`RtspHlsPlayer`] applies
//! `play` defaults, forwards calls to a [`NativeHandler`] and routes the
//! tagged results it streams back. [`ControlServer`] exposes the same handler
//! over a WebSocket control channel.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod protocol;
pub mod server;

// Re-export main types
pub use bridge::{
    ActionCallback, ErrorCallback, NativeError, NativeHandler, NativeResult, PlayCallbacks,
    PlaySession, ResultSender, RtspHlsPlayer, StatusCallback, StatusUpdate,
};
pub use protocol::{
    ActionResult, ControlMessage, ControlResponse, PlayOptions, PlayRequest, PluginResult,
    StatusResult,
};
pub use server::{ConnectionInfo, ControlServer};
