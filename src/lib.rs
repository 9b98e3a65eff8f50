//! Socket relay library.
//!
//! One broadcast relay, two transports: a raw WebSocket server where every
//! text frame is fanned out to all connected clients, and a Socket.IO server
//! doing the same for the `chat message` event. Both consume the same
//! [`registry::ConnectionRegistry`] and [`relay::Relay`], differing only in
//! framing and in the label they prefix to relayed text.

pub mod config;
pub mod native;
pub mod registry;
pub mod relay;
pub mod socketio;
