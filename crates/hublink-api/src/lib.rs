// hublink-api: Wire protocol and hub-facing collaborators for the hublink engine.
//
// This crate is the boundary between the session engine (hublink-core) and
// the outside world: the JSON frame codec, the WebSocket transport, and the
// REST collaborators (login, device directory) that run before a session
// exists. Nothing in here holds device state -- that lives in hublink-core.

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod frame;
pub mod transport;

pub use auth::{AuthClient, SessionTokens};
pub use config::HubConfig;
pub use directory::{AttributeRecord, DeviceRecord, DirectoryClient};
pub use error::Error;
pub use frame::{AckStatus, AttributeValue, CorrelationId, Frame, FrameKind, TopicId};
pub use transport::Transport;
