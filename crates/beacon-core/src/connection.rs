//! Outbound side of the messaging transport.
//!
//! The core never inspects transport internals; it only needs a way to send
//! replies and files and, for group handlers, to manage the group's file
//! folders. The transport crate (or a test double) implements [`Connection`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{TransportError, TransportResult};
use crate::message::{GroupId, MessageId, Segment, UserId};

/// Acknowledgement returned by the backend for a sent message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    /// The ID assigned to the sent message.
    pub message_id: MessageId,
    /// Backend timestamp of the sent message.
    pub time: u64,
}

/// A folder in a group's shared file space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFolder {
    /// Backend folder ID.
    pub folder_id: String,
    /// Display name.
    pub name: String,
}

/// Where the bytes of an uploaded file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file on the local disk.
    Path(PathBuf),
    /// A remote file the transport downloads before uploading.
    Url(String),
}

/// A live connection to the messaging backend.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Sends a private message to `user_id`.
    async fn send_private(&self, user_id: UserId, elements: Vec<Segment>)
    -> TransportResult<Receipt>;

    /// Sends a message to a group.
    async fn send_group(&self, group_id: GroupId, elements: Vec<Segment>)
    -> TransportResult<Receipt>;

    /// Sends a message in a temporary conversation.
    async fn send_temp(
        &self,
        group_id: GroupId,
        user_id: UserId,
        elements: Vec<Segment>,
    ) -> TransportResult<Receipt>;

    /// Creates a folder under `parent_path` in the group's file space.
    async fn create_group_folder(
        &self,
        group_id: GroupId,
        parent_path: &str,
        name: &str,
    ) -> TransportResult<()>;

    /// Lists the folders in the group's root directory.
    async fn list_group_folders(&self, group_id: GroupId) -> TransportResult<Vec<GroupFolder>>;

    /// Uploads a file into a private conversation.
    async fn upload_private_file(
        &self,
        user_id: UserId,
        source: FileSource,
        name: &str,
    ) -> TransportResult<()>;

    /// Uploads a file into a group folder. `folder_id` is `/` for the root.
    async fn upload_group_file(
        &self,
        group_id: GroupId,
        source: FileSource,
        name: &str,
        folder_id: &str,
    ) -> TransportResult<()>;
}

/// A shared, type-erased connection.
pub type BoxedConnection = Arc<dyn Connection>;

/// A connection that refuses every operation.
///
/// Used for contexts rebuilt from stored messages, where no live transport
/// is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedConnection;

#[async_trait]
impl Connection for DetachedConnection {
    async fn send_private(&self, _user_id: UserId, _elements: Vec<Segment>) -> TransportResult<Receipt> {
        Err(TransportError::NotConnected)
    }

    async fn send_group(&self, _group_id: GroupId, _elements: Vec<Segment>) -> TransportResult<Receipt> {
        Err(TransportError::NotConnected)
    }

    async fn send_temp(
        &self,
        _group_id: GroupId,
        _user_id: UserId,
        _elements: Vec<Segment>,
    ) -> TransportResult<Receipt> {
        Err(TransportError::NotConnected)
    }

    async fn create_group_folder(
        &self,
        _group_id: GroupId,
        _parent_path: &str,
        _name: &str,
    ) -> TransportResult<()> {
        Err(TransportError::NotConnected)
    }

    async fn list_group_folders(&self, _group_id: GroupId) -> TransportResult<Vec<GroupFolder>> {
        Err(TransportError::NotConnected)
    }

    async fn upload_private_file(
        &self,
        _user_id: UserId,
        _source: FileSource,
        _name: &str,
    ) -> TransportResult<()> {
        Err(TransportError::NotConnected)
    }

    async fn upload_group_file(
        &self,
        _group_id: GroupId,
        _source: FileSource,
        _name: &str,
        _folder_id: &str,
    ) -> TransportResult<()> {
        Err(TransportError::NotConnected)
    }
}

// =============================================================================
// In-memory connection
// =============================================================================

/// Where an outbound message recorded by [`MemoryConnection`] was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// A private conversation.
    Private(UserId),
    /// A group.
    Group(GroupId),
    /// A temporary conversation.
    Temp(GroupId, UserId),
}

/// An outbound message recorded by [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Where the message was sent.
    pub destination: Destination,
    /// The sent content.
    pub elements: Vec<Segment>,
}

/// A file upload recorded by [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Where the file was sent.
    pub destination: Destination,
    /// Where the file came from.
    pub source: FileSource,
    /// The file name shown to recipients.
    pub name: String,
    /// Target folder for group uploads.
    pub folder_id: Option<String>,
}

/// A connection that keeps everything it is asked to send in memory.
///
/// Useful for demos and for exercising handlers without a backend.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    sent: Mutex<Vec<Outbound>>,
    uploads: Mutex<Vec<Upload>>,
    folders: Mutex<HashMap<GroupId, Vec<GroupFolder>>>,
    next_id: AtomicU32,
}

impl MemoryConnection {
    /// Creates an empty connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything sent so far.
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().clone()
    }

    /// Returns a copy of every uploaded file.
    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().clone()
    }

    /// Returns the folders created in a group.
    pub fn folders(&self, group_id: GroupId) -> Vec<GroupFolder> {
        self.folders.lock().get(&group_id).cloned().unwrap_or_default()
    }

    fn record(&self, destination: Destination, elements: Vec<Segment>) -> Receipt {
        self.sent.lock().push(Outbound {
            destination,
            elements,
        });
        Receipt {
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            time: 0,
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send_private(&self, user_id: UserId, elements: Vec<Segment>) -> TransportResult<Receipt> {
        Ok(self.record(Destination::Private(user_id), elements))
    }

    async fn send_group(&self, group_id: GroupId, elements: Vec<Segment>) -> TransportResult<Receipt> {
        Ok(self.record(Destination::Group(group_id), elements))
    }

    async fn send_temp(
        &self,
        group_id: GroupId,
        user_id: UserId,
        elements: Vec<Segment>,
    ) -> TransportResult<Receipt> {
        Ok(self.record(Destination::Temp(group_id, user_id), elements))
    }

    async fn create_group_folder(
        &self,
        group_id: GroupId,
        parent_path: &str,
        name: &str,
    ) -> TransportResult<()> {
        let mut folders = self.folders.lock();
        let entry = folders.entry(group_id).or_default();
        let folder_id = format!("{}{}#{}", parent_path, name, entry.len());
        entry.push(GroupFolder {
            folder_id,
            name: name.to_string(),
        });
        Ok(())
    }

    async fn list_group_folders(&self, group_id: GroupId) -> TransportResult<Vec<GroupFolder>> {
        Ok(self.folders(group_id))
    }

    async fn upload_private_file(
        &self,
        user_id: UserId,
        source: FileSource,
        name: &str,
    ) -> TransportResult<()> {
        self.uploads.lock().push(Upload {
            destination: Destination::Private(user_id),
            source,
            name: name.to_string(),
            folder_id: None,
        });
        Ok(())
    }

    async fn upload_group_file(
        &self,
        group_id: GroupId,
        source: FileSource,
        name: &str,
        folder_id: &str,
    ) -> TransportResult<()> {
        self.uploads.lock().push(Upload {
            destination: Destination::Group(group_id),
            source,
            name: name.to_string(),
            folder_id: Some(folder_id.to_string()),
        });
        Ok(())
    }
}
