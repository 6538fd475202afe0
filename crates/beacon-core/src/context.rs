//! The per-event execution context.
//!
//! [`MessageContext`] wraps one inbound message together with the connection it
//! arrived on. It is created once per event, wrapped in an `Arc`, and handed to
//! every matcher, middleware and handler that processes that event.
//!
//! # Derived text
//!
//! The plain text of the message is computed once at construction by
//! concatenating every text segment in order. It is never recomputed.
//!
//! # Metadata
//!
//! A string-keyed bag of arbitrary values lets stages pass derived facts
//! forward (parsed command, authorization flag, ...). Keys are not namespaced;
//! the keys written by built-in components are listed in [`keys`].
//!
//! Metadata lives for one event only. Handlers that spawn background work
//! touching the same context must coordinate that work themselves.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::connection::{BoxedConnection, FileSource, Receipt};
use crate::error::{TransportError, TransportResult};
use crate::message::{
    GroupId, GroupMessage, InboundMessage, PrivateMessage, Segment, Sender, TempMessage, UserId,
    Variant, extract_plain_text,
};

/// Metadata keys written by built-in matchers and middleware.
pub mod keys {
    /// Matched command name (`String`), written by the command matcher.
    pub const COMMAND: &str = "command";
    /// Remaining command tokens (`Vec<String>`), written by the command matcher.
    pub const ARGS: &str = "args";
    /// Message kind (`&'static str`), written by the metrics middleware.
    pub const MESSAGE_TYPE: &str = "message_type";
    /// Processing timestamp (`SystemTime`), written by the metrics middleware.
    pub const PROCESSED_AT: &str = "processed_at";
    /// Authorized sender (`UserId`), written by the authorization middleware.
    pub const USER_ID: &str = "user_id";
    /// Authorization flag (`bool`), written by the authorization middleware.
    pub const AUTHORIZED: &str = "authorized";
    /// Error message (`String`), written by the metrics middleware on failure.
    pub const PROCESSING_ERROR: &str = "processing_error";
    /// Executed command (`String`), written when a command route completes.
    pub const EXECUTED_COMMAND: &str = "executed_command";
}

type MetaValue = Arc<dyn Any + Send + Sync>;

/// The context object passed to matchers, middleware and handlers.
///
/// # Example
///
/// ```rust,ignore
/// async fn handle(ctx: Arc<MessageContext>) -> HandlerResult {
///     if ctx.text().contains("ping") {
///         ctx.send_reply(vec![Segment::text("pong")]).await?;
///     }
///     Ok(())
/// }
/// ```
pub struct MessageContext {
    connection: BoxedConnection,
    message: InboundMessage,
    text: String,
    metadata: RwLock<HashMap<String, MetaValue>>,
}

impl MessageContext {
    /// Creates a new context and computes the derived text.
    pub fn new(connection: BoxedConnection, message: InboundMessage) -> Self {
        let text = extract_plain_text(message.elements());
        Self {
            connection,
            message,
            text,
            metadata: RwLock::new(HashMap::new()),
        }
    }

    // ─── Message access ───────────────────────────────────────────────────────

    /// Returns the derived plain text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the wrapped inbound message.
    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    /// Returns the variant of the wrapped message.
    pub fn variant(&self) -> Variant {
        self.message.variant()
    }

    /// Returns the content elements.
    pub fn elements(&self) -> &[Segment] {
        self.message.elements()
    }

    /// Returns the sender.
    pub fn sender(&self) -> &Sender {
        self.message.sender()
    }

    /// Returns the sender's user ID.
    pub fn sender_id(&self) -> UserId {
        self.message.sender().user_id
    }

    /// Returns the group ID, if the variant has one.
    pub fn group_id(&self) -> Option<GroupId> {
        self.message.group_id()
    }

    /// Returns the connection the message arrived on.
    pub fn connection(&self) -> &BoxedConnection {
        &self.connection
    }

    /// Returns the private message, or `None` for other variants.
    pub fn private(&self) -> Option<&PrivateMessage> {
        match &self.message {
            InboundMessage::Private(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the group message, or `None` for other variants.
    pub fn group(&self) -> Option<&GroupMessage> {
        match &self.message {
            InboundMessage::Group(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the temporary-conversation message, or `None` for other variants.
    pub fn temp(&self) -> Option<&TempMessage> {
        match &self.message {
            InboundMessage::Temp(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the private message.
    ///
    /// # Panics
    ///
    /// Panics if the message is not private. Only call this from handlers whose
    /// route already guarantees the variant through a matcher.
    pub fn expect_private(&self) -> &PrivateMessage {
        match self.private() {
            Some(msg) => msg,
            None => panic!("expected a private message, got {}", self.variant()),
        }
    }

    /// Returns the group message.
    ///
    /// # Panics
    ///
    /// Panics if the message is not a group message. Only call this from
    /// handlers whose route already guarantees the variant through a matcher.
    pub fn expect_group(&self) -> &GroupMessage {
        match self.group() {
            Some(msg) => msg,
            None => panic!("expected a group message, got {}", self.variant()),
        }
    }

    /// Returns the temporary-conversation message.
    ///
    /// # Panics
    ///
    /// Panics if the message is not a temporary-conversation message.
    pub fn expect_temp(&self) -> &TempMessage {
        match self.temp() {
            Some(msg) => msg,
            None => panic!("expected a temp message, got {}", self.variant()),
        }
    }

    // ─── Metadata ─────────────────────────────────────────────────────────────

    /// Stores a metadata value, replacing any previous value under `key`.
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.metadata.write().insert(key.into(), Arc::new(value));
    }

    /// Returns a clone of the value stored under `key`.
    ///
    /// Returns `None` if the key is absent or holds a different type.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.metadata
            .read()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Returns the string stored under `key`, or an empty string.
    ///
    /// Both `String` and `&'static str` values are recognised.
    pub fn get_string(&self, key: &str) -> String {
        let metadata = self.metadata.read();
        match metadata.get(key) {
            Some(value) => {
                if let Some(s) = value.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = value.downcast_ref::<&'static str>() {
                    (*s).to_string()
                } else {
                    String::new()
                }
            }
            None => String::new(),
        }
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.metadata.read().contains_key(key)
    }

    /// Removes the value stored under `key`, returning whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.metadata.write().remove(key).is_some()
    }

    /// Returns the metadata keys currently set.
    pub fn metadata_keys(&self) -> Vec<String> {
        self.metadata.read().keys().cloned().collect()
    }

    // ─── Transport delegation ─────────────────────────────────────────────────

    /// Sends a reply into the conversation the message came from.
    ///
    /// Group replies mention the sender first. Transport errors are returned
    /// unchanged.
    pub async fn send_reply(&self, elements: Vec<Segment>) -> TransportResult<Receipt> {
        match &self.message {
            InboundMessage::Private(msg) => {
                self.connection
                    .send_private(msg.sender.user_id, elements)
                    .await
            }
            InboundMessage::Group(msg) => {
                let mut content = Vec::with_capacity(elements.len() + 2);
                content.push(Segment::mention(msg.sender.user_id));
                content.push(Segment::text(" \n"));
                content.extend(elements);
                self.connection.send_group(msg.group_id, content).await
            }
            InboundMessage::Temp(msg) => {
                self.connection
                    .send_temp(msg.group_id, msg.sender.user_id, elements)
                    .await
            }
        }
    }

    /// Sends a plain-text reply.
    pub async fn reply_text(&self, text: impl Into<String>) -> TransportResult<Receipt> {
        self.send_reply(vec![Segment::text(text)]).await
    }

    /// Uploads a file into the conversation the message came from.
    ///
    /// Group uploads land in `folder_id`, or the root folder when it is
    /// `None` or empty. Private uploads ignore the folder. Temporary
    /// conversations cannot receive files.
    pub async fn send_file(
        &self,
        source: FileSource,
        name: &str,
        folder_id: Option<&str>,
    ) -> TransportResult<()> {
        match &self.message {
            InboundMessage::Private(msg) => {
                self.connection
                    .upload_private_file(msg.sender.user_id, source, name)
                    .await
            }
            InboundMessage::Group(msg) => {
                let folder = folder_id.filter(|id| !id.is_empty()).unwrap_or("/");
                self.connection
                    .upload_group_file(msg.group_id, source, name, folder)
                    .await
            }
            InboundMessage::Temp(_) => Err(TransportError::Unsupported {
                operation: "send_file",
                variant: self.variant(),
            }),
        }
    }

    /// Creates a folder in the group's root directory and returns its ID.
    ///
    /// Only available for group messages.
    pub async fn create_group_folder(&self, name: &str) -> TransportResult<String> {
        let Some(group) = self.group() else {
            return Err(TransportError::Unsupported {
                operation: "create_group_folder",
                variant: self.variant(),
            });
        };

        self.connection
            .create_group_folder(group.group_id, "/", name)
            .await?;
        let folders = self.connection.list_group_folders(group.group_id).await?;

        folders
            .into_iter()
            .find(|folder| folder.name == name)
            .map(|folder| folder.folder_id)
            .ok_or_else(|| TransportError::FolderNotFound {
                group_id: group.group_id,
                name: name.to_string(),
            })
    }

    /// Returns `true` for group messages; otherwise tells the sender to use a
    /// group chat and returns `false`.
    pub async fn reject_unless_group(&self) -> bool {
        if self.group().is_some() {
            return true;
        }
        if let Err(e) = self
            .reply_text("Please use this command in a group chat.")
            .await
        {
            warn!(error = %e, "Failed to send scope notice");
        }
        false
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("variant", &self.variant())
            .field("text", &self.text)
            .field("metadata_keys", &self.metadata_keys())
            .finish_non_exhaustive()
    }
}
