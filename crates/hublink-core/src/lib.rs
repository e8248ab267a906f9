//! Session engine for a smart-home hub's real-time messaging service.
//!
//! Give [`Session::connect`] an authenticated
//! [`Transport`](hublink_api::Transport) and it runs a single dispatch
//! loop that correlates command acknowledgments, maintains the device
//! state cache, and fans update events out to subscribers -- all in
//! strict arrival order. Applications talk to devices through the
//! [`Device`] facade and its typed views in [`kinds`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), hublink_core::EngineError> {
//! use std::time::Duration;
//! use hublink_api::Transport;
//! use hublink_core::Session;
//!
//! # let socket_url = "wss://example.invalid/socket".parse().unwrap();
//! let transport = Transport::connect(&socket_url).await?;
//! let session = Session::connect(transport)?;
//!
//! let lock = session.device("devices:412".into(), hublink_core::DeviceKind::Lock, "front door");
//! lock.set("locked", true, Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod correlation;
pub mod device;
pub mod error;
pub mod kinds;
pub mod registry;
pub mod session;

pub use cache::Attribute;
pub use device::{Device, DeviceKind, UpdateStream};
pub use error::EngineError;
pub use registry::{SubscriptionHandle, UpdateEvent, UpdateReceiver};
pub use session::{Diagnostic, Session, SessionState};

// Wire-level types callers need alongside the engine.
pub use hublink_api::{AttributeValue, TopicId};
