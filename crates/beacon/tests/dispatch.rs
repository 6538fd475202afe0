//! End-to-end dispatch through the runtime, router and event bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon::core::{
    Destination, GroupMessage, MemoryConnection, PrivateMessage, Sender, TempMessage, UserId,
};
use beacon::prelude::*;
use tokio::sync::mpsc;

fn private(user_id: i64, text: &str) -> InboundMessage {
    PrivateMessage {
        id: 1,
        time: 0,
        sender: Sender::new(user_id),
        elements: vec![Segment::text(text)],
    }
    .into()
}

fn group(group_id: i64, user_id: i64, text: &str) -> InboundMessage {
    GroupMessage {
        id: 2,
        time: 0,
        group_id,
        group_name: "testers".to_string(),
        sender: Sender::new(user_id),
        elements: vec![Segment::text(text)],
    }
    .into()
}

fn temp(group_id: i64, user_id: i64, text: &str) -> InboundMessage {
    TempMessage {
        id: 3,
        time: 0,
        group_id,
        group_name: "testers".to_string(),
        sender: Sender::new(user_id),
        elements: vec![Segment::text(text)],
    }
    .into()
}

fn runtime() -> BeaconRuntime {
    let mut config = BeaconConfig::default();
    config.dispatch.logging = false;
    BeaconRuntime::from_config(&config)
}

fn collect(runtime: &BeaconRuntime, topic: &str) -> mpsc::UnboundedReceiver<Arc<Event>> {
    let (tx, rx) = mpsc::unbounded_channel();
    runtime.subscribe(
        topic,
        event_handler_fn(move |event, _cancel| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
                Ok(())
            }
        }),
    );
    rx
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Arc<Event>>) -> Arc<Event> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("bus dropped subscriber")
}

fn texts(connection: &MemoryConnection) -> Vec<(Destination, String)> {
    connection
        .sent()
        .into_iter()
        .map(|out| {
            let text = out
                .elements
                .iter()
                .filter_map(Segment::as_text)
                .collect::<String>();
            (out.destination, text)
        })
        .collect()
}

#[tokio::test]
async fn test_replies_follow_the_conversation() {
    let runtime = runtime();
    runtime.handle_command(
        "ping",
        handler_fn(|ctx| async move {
            ctx.reply_text("pong").await?;
            Ok(())
        }),
    );

    let connection = Arc::new(MemoryConnection::new());
    runtime.deliver(connection.clone(), private(10, "/ping")).await;
    runtime.deliver(connection.clone(), group(500, 10, "/ping")).await;
    runtime.deliver(connection.clone(), temp(500, 11, "/ping")).await;
    runtime.deliver(connection.clone(), private(10, "ping")).await;

    assert_eq!(
        texts(&connection),
        vec![
            (Destination::Private(10), "pong".to_string()),
            (Destination::Group(500), " \npong".to_string()),
            (Destination::Temp(500, 11), "pong".to_string()),
        ]
    );

    let mentions: Vec<Option<UserId>> = connection
        .sent()
        .iter()
        .map(|out| out.elements.first().and_then(Segment::as_mention))
        .collect();
    assert_eq!(mentions, vec![None, Some(10), None]);
    runtime.close().await;
}

#[tokio::test]
async fn test_group_only_command() {
    let runtime = runtime();
    let mut errors = collect(&runtime, topics::ERROR_OCCURRED);

    runtime
        .handle_command(
            "folder",
            handler_fn(|ctx| async move {
                let args: Vec<String> = ctx.get(keys::ARGS).unwrap_or_default();
                let name = args.first().cloned().unwrap_or_else(|| "shared".to_string());
                let id = ctx.create_group_folder(&name).await?;
                ctx.reply_text(format!("created {id}")).await?;
                Ok(())
            }),
        )
        .add_middleware(GroupOnly);

    let connection = Arc::new(MemoryConnection::new());
    runtime.deliver(connection.clone(), private(1, "/folder docs")).await;
    assert!(connection.sent().is_empty());

    let event = recv(&mut errors).await;
    let payload = event.payload::<ErrorEvent>().unwrap();
    assert!(payload.error.contains("group"));

    runtime.deliver(connection.clone(), group(77, 1, "/folder docs")).await;
    assert_eq!(connection.folders(77).len(), 1);
    assert_eq!(texts(&connection).len(), 1);
    runtime.close().await;
}

#[tokio::test]
async fn test_every_matching_route_runs() {
    let runtime = runtime();
    let seen: Arc<Mutex<Vec<&'static str>>> = Arc::default();

    for name in ["first", "second"] {
        let seen = seen.clone();
        runtime.router().add_route(
            Route::new(
                name,
                handler_fn(move |_ctx| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(name);
                        Ok(())
                    }
                }),
            )
            .with_matcher(TextMatcher::new("hello")),
        );
    }
    let other = seen.clone();
    runtime.router().add_route(
        Route::new(
            "never",
            handler_fn(move |_ctx| {
                let other = other.clone();
                async move {
                    other.lock().unwrap().push("never");
                    Ok(())
                }
            }),
        )
        .with_matcher(and(vec![is_private().into_matcher(), not(is_private()).into_matcher()])),
    );

    let matched = runtime
        .deliver(Arc::new(MemoryConnection::new()), group(1, 2, "Well HELLO there"))
        .await;

    assert_eq!(matched, 2);
    assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    runtime.close().await;
}

#[tokio::test]
async fn test_lifecycle_and_command_events() {
    let runtime = runtime();
    let mut received = collect(&runtime, topics::MESSAGE_RECEIVED);
    let mut executed = collect(&runtime, topics::COMMAND_EXECUTED);
    let mut processed = collect(&runtime, topics::MESSAGE_PROCESSED);

    runtime.handle_command("login", handler_fn(|_ctx| async { Ok(()) }));
    runtime
        .deliver(Arc::new(MemoryConnection::new()), private(3, "/login extra"))
        .await;

    let event = recv(&mut received).await;
    assert_eq!(event.payload::<MessageEvent>().unwrap().context.text(), "/login extra");

    let event = recv(&mut executed).await;
    let ctx = &event.payload::<MessageEvent>().unwrap().context;
    assert_eq!(ctx.get_string(keys::COMMAND), "login");
    assert_eq!(ctx.get::<Vec<String>>(keys::ARGS), Some(vec!["extra".to_string()]));
    assert_eq!(ctx.get_string(keys::EXECUTED_COMMAND), "login");

    let event = recv(&mut processed).await;
    let ctx = &event.payload::<MessageEvent>().unwrap().context;
    assert_eq!(ctx.get_string(keys::MESSAGE_TYPE), "private");
    runtime.close().await;
}

#[tokio::test]
async fn test_run_drains_channel() {
    let runtime = runtime();
    let connection = Arc::new(MemoryConnection::new());
    runtime.handle_private(
        "echo",
        handler_fn(|ctx| async move {
            let text = ctx.text().to_string();
            ctx.reply_text(text).await?;
            Ok(())
        }),
    );

    let (tx, rx) = mpsc::channel(16);
    for i in 0..5 {
        let message = private(i, &format!("message {i}"));
        tx.send(Inbound::new(connection.clone(), message)).await.unwrap();
    }
    drop(tx);

    runtime.run_until(rx, std::future::pending()).await.unwrap();

    let mut replies: Vec<String> = texts(&connection).into_iter().map(|(_, t)| t).collect();
    replies.sort();
    assert_eq!(
        replies,
        (0..5).map(|i| format!("message {i}")).collect::<Vec<_>>()
    );
}
