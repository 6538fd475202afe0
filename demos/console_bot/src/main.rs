//! Console Bot Example
//!
//! Drives the Beacon runtime from standard input. Each line becomes an
//! inbound message; replies are printed to standard output.
//!
//! # Input
//!
//! ```text
//! /ping                  private message from --user
//! #42 /folder reports    group message in group 42
//! ~42 /help              temp conversation started from group 42
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --user 10001
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use beacon::core::{
    FileSource, GroupFolder, GroupId, GroupMessage, MemoryStore, PrivateMessage, Receipt, Sender,
    TempMessage, TransportResult, UserId,
};
use beacon::prelude::*;
use clap::Parser;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Chat with a Beacon bot from the terminal")]
struct Args {
    /// Configuration file (defaults to beacon.toml in the current directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// User ID the console speaks as
    #[arg(short, long, default_value_t = 10001)]
    user: UserId,
}

// ============================================================================
// Console connection
// ============================================================================

/// Prints outbound messages and keeps group folders in memory.
#[derive(Default)]
struct ConsoleConnection {
    next_id: AtomicU32,
    folders: Mutex<HashMap<GroupId, Vec<GroupFolder>>>,
}

impl ConsoleConnection {
    fn print(&self, target: String, elements: &[Segment]) -> Receipt {
        let text: String = elements.iter().map(ToString::to_string).collect();
        println!("[bot -> {target}] {text}");
        Receipt {
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            time: 0,
        }
    }
}

#[async_trait]
impl Connection for ConsoleConnection {
    async fn send_private(&self, user_id: UserId, elements: Vec<Segment>) -> TransportResult<Receipt> {
        Ok(self.print(format!("user {user_id}"), &elements))
    }

    async fn send_group(&self, group_id: GroupId, elements: Vec<Segment>) -> TransportResult<Receipt> {
        Ok(self.print(format!("group {group_id}"), &elements))
    }

    async fn send_temp(
        &self,
        group_id: GroupId,
        user_id: UserId,
        elements: Vec<Segment>,
    ) -> TransportResult<Receipt> {
        Ok(self.print(format!("user {user_id} via group {group_id}"), &elements))
    }

    async fn create_group_folder(
        &self,
        group_id: GroupId,
        parent_path: &str,
        name: &str,
    ) -> TransportResult<()> {
        let mut folders = self.folders.lock();
        let entry = folders.entry(group_id).or_default();
        if !entry.iter().any(|folder| folder.name == name) {
            entry.push(GroupFolder {
                folder_id: format!("{parent_path}{name}"),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn list_group_folders(&self, group_id: GroupId) -> TransportResult<Vec<GroupFolder>> {
        Ok(self.folders.lock().get(&group_id).cloned().unwrap_or_default())
    }

    async fn upload_private_file(
        &self,
        user_id: UserId,
        source: FileSource,
        name: &str,
    ) -> TransportResult<()> {
        println!("[bot -> user {user_id}] file {name} from {source:?}");
        Ok(())
    }

    async fn upload_group_file(
        &self,
        group_id: GroupId,
        source: FileSource,
        name: &str,
        folder_id: &str,
    ) -> TransportResult<()> {
        println!("[bot -> group {group_id}] file {name} into {folder_id} from {source:?}");
        Ok(())
    }
}

/// Turns one console line into a message.
fn parse_line(line: &str, user: UserId, id: u32) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let scoped = |rest: &str| -> Option<(GroupId, String)> {
        let (group, text) = rest.split_once(' ').unwrap_or((rest, ""));
        Some((group.parse().ok()?, text.to_string()))
    };

    let message = if let Some(rest) = line.strip_prefix('#') {
        let (group_id, text) = scoped(rest)?;
        GroupMessage {
            id,
            time: 0,
            group_id,
            group_name: format!("console-{group_id}"),
            sender: Sender::new(user).nickname("console"),
            elements: vec![Segment::text(text)],
        }
        .into()
    } else if let Some(rest) = line.strip_prefix('~') {
        let (group_id, text) = scoped(rest)?;
        TempMessage {
            id,
            time: 0,
            group_id,
            group_name: format!("console-{group_id}"),
            sender: Sender::new(user).nickname("console"),
            elements: vec![Segment::text(text)],
        }
        .into()
    } else {
        PrivateMessage {
            id,
            time: 0,
            sender: Sender::new(user).nickname("console"),
            elements: vec![Segment::text(line)],
        }
        .into()
    };
    Some(message)
}

// ============================================================================
// Handlers
// ============================================================================

async fn help_handler(ctx: Arc<MessageContext>) -> HandlerResult {
    ctx.reply_text(
        "Commands:\n  \
         /help            - this help\n  \
         /ping            - pong\n  \
         /echo <text>     - echo text\n  \
         /upload <path>   - send a local file back\n  \
         /login           - start a session (group only)\n  \
         /logout          - end your session (group only)\n  \
         /folder <name>   - create a group folder (group only)",
    )
    .await?;
    Ok(())
}

async fn ping_handler(ctx: Arc<MessageContext>) -> HandlerResult {
    ctx.reply_text("Pong!").await?;
    Ok(())
}

async fn echo_handler(ctx: Arc<MessageContext>) -> HandlerResult {
    let args: Vec<String> = ctx.get(keys::ARGS).unwrap_or_default();
    if args.is_empty() {
        return Err(HandlerError::msg("nothing to echo"));
    }
    ctx.reply_text(args.join(" ")).await?;
    Ok(())
}

async fn upload_handler(ctx: Arc<MessageContext>) -> HandlerResult {
    let args: Vec<String> = ctx.get(keys::ARGS).unwrap_or_default();
    let Some(path) = args.first() else {
        return Err(HandlerError::msg("usage: /upload <path>"));
    };
    let name = PathBuf::from(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.clone());
    ctx.send_file(FileSource::Path(path.into()), &name, None).await?;
    Ok(())
}

async fn folder_handler(ctx: Arc<MessageContext>) -> HandlerResult {
    let args: Vec<String> = ctx.get(keys::ARGS).unwrap_or_default();
    let name = args.first().map(String::as_str).unwrap_or("shared");
    let folder_id = ctx.create_group_folder(name).await?;
    ctx.reply_text(format!("Folder ready: {folder_id}")).await?;
    Ok(())
}

/// `/login` and `/logout` share a session set and only work in groups.
fn session_handler(sessions: Arc<Mutex<HashSet<UserId>>>, login: bool) -> BoxedHandler {
    handler_fn(move |ctx: Arc<MessageContext>| {
        let sessions = sessions.clone();
        async move {
            if !ctx.reject_unless_group().await {
                return Ok(());
            }
            let user = ctx.sender_id();
            let active = sessions.lock().contains(&user);
            let reply = match (login, active) {
                (true, true) => "Already logged in.",
                (true, false) => "Logged in.",
                (false, true) => "Session removed.",
                (false, false) => "No active session.",
            };
            if login {
                sessions.lock().insert(user);
            } else {
                sessions.lock().remove(&user);
            }
            ctx.reply_text(reply).await?;
            Ok(())
        }
    })
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = match &args.config {
        Some(path) => BeaconRuntime::builder().config_file(path).build()?,
        None => BeaconRuntime::new(),
    }
    .with_store(Arc::new(MemoryStore::new()));

    // Commands
    runtime.handle_command("help", handler_fn(help_handler));
    runtime.handle_command("ping", handler_fn(ping_handler));
    runtime.handle_command("echo", handler_fn(echo_handler));
    runtime.handle_command("upload", handler_fn(upload_handler));
    runtime
        .handle_command("folder", handler_fn(folder_handler))
        .add_middleware(GroupOnly);

    let sessions = Arc::new(Mutex::new(HashSet::new()));
    runtime.handle_command("login", session_handler(sessions.clone(), true));
    runtime.handle_command("logout", session_handler(sessions, false));

    // Observers
    runtime.subscribe(
        topics::COMMAND_EXECUTED,
        event_handler_fn(|event, _cancel| async move {
            if let Some(payload) = event.payload::<MessageEvent>() {
                info!(
                    command = %payload.context.get_string(keys::EXECUTED_COMMAND),
                    sender = payload.context.sender_id(),
                    "Command executed"
                );
            }
            Ok(())
        }),
    );
    runtime.subscribe(
        topics::ERROR_OCCURRED,
        event_handler_fn(|event, _cancel| async move {
            if let Some(payload) = event.payload::<ErrorEvent>() {
                println!("[bot !] {}", payload.error);
            }
            Ok(())
        }),
    );

    // Feed stdin into the runtime
    let connection: BoxedConnection = Arc::new(ConsoleConnection::default());
    let (tx, rx) = mpsc::channel(64);
    let user = args.user;
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut next_id = 0_u32;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    next_id += 1;
                    let Some(message) = parse_line(&line, user, next_id) else {
                        continue;
                    };
                    if tx.send(Inbound::new(connection.clone(), message)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read from stdin");
                    break;
                }
            }
        }
    });

    info!(user, "Console bot ready. Type /help, Ctrl+D to quit.");
    runtime.run(rx).await?;

    Ok(())
}
