//! Live WebSocket sessions
//!
//! Clients connect to `/infra/ws?token=...`; the token is checked by the auth
//! service before the upgrade completes. Services push to users through the
//! [`SessionRegistry`] held in the application state.

pub mod handler;
pub mod listener;
pub mod registry;

pub use handler::upgrade;
pub use listener::{MessageListener, MessageListeners};
pub use registry::{FrameWriter, SessionRegistry, WebSocketSession, WsMessage};
