//! # Beacon Core
//!
//! The foundation layer of the Beacon message-dispatch core.
//!
//! This crate provides the types every other layer is built on:
//! - **Message model**: the closed [`InboundMessage`] variant set and its [`Segment`]s
//! - **Execution context**: [`MessageContext`], the per-event state carrier
//! - **Handlers**: the [`Handler`] trait that routes and middleware compose around
//! - **Collaborators**: the [`Connection`] (transport) and [`MessageStore`] (persistence) traits
//!
//! ## Flow
//!
//! ```text
//! ┌───────────┐  InboundMessage  ┌────────────────┐   Arc<MessageContext>   ┌─────────┐
//! │ Transport │─────────────────▶│ MessageContext │────────────────────────▶│ Handler │
//! └───────────┘                  └────────────────┘                         └─────────┘
//!       ▲                                 │ send_reply
//!       └─────────────────────────────────┘
//! ```

pub mod connection;
pub mod context;
pub mod error;
pub mod handler;
pub mod message;
pub mod store;

pub use connection::{
    BoxedConnection, Connection, Destination, DetachedConnection, FileSource, GroupFolder,
    MemoryConnection, Outbound, Receipt, Upload,
};
pub use context::{MessageContext, keys};
pub use error::{
    BoxError, HandlerError, HandlerResult, Rejection, StoreError, StoreResult, TransportError,
    TransportResult,
};
pub use handler::{BoxFuture, BoxedHandler, Handler, HandlerFn, handler_fn, into_handler};
pub use message::{
    GroupId, GroupMessage, InboundMessage, MessageId, PrivateMessage, Segment, Sender,
    TempMessage, UserId, Variant, extract_plain_text,
};
pub use store::{MemoryStore, MessageStore};

/// Prelude for common imports.
pub mod prelude {
    pub use super::context::{MessageContext, keys};
    pub use super::error::{HandlerError, HandlerResult, Rejection};
    pub use super::handler::{BoxedHandler, Handler, handler_fn};
    pub use super::message::{InboundMessage, Segment, Variant};
}
