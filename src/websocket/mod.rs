//! WebSocket module for the chat server
//!
//! This module holds the per-client connection state machine, the JSON
//! wire protocol and the socket accept loop that drives them.

mod connection;
mod server;

pub use connection::{ClientMessage, Connection, ConnectionState, ServerMessage};
pub use server::WebSocketServer;
