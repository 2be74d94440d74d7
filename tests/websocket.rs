use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use huddle_server::config::ChatConfig;
use huddle_server::websocket::{ServerMessage, WebSocketServer};
use huddle_server::{ChatHub, MessageKind, ValidationField};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server(chat: ChatConfig) -> (Url, Arc<ChatHub>) {
    let hub = Arc::new(ChatHub::new(chat));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(WebSocketServer::new(hub.clone()));
    tokio::spawn(server.run(listener));
    (Url::parse(&format!("ws://{}", addr)).unwrap(), hub)
}

async fn connect(url: &Url) -> Client {
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    match next_message(&mut client).await {
        ServerMessage::Welcome { avatars } => assert!(!avatars.is_empty()),
        other => panic!("expected welcome, got {:?}", other),
    }
    client
}

async fn send(client: &mut Client, value: serde_json::Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

async fn next_message(client: &mut Client) -> ServerMessage {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for server")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn join(client: &mut Client, name: &str, avatar: usize) {
    send(client, json!({"type": "join", "payload": {"name": name, "avatar": avatar}})).await;
    match next_message(client).await {
        ServerMessage::Joined { name: joined, .. } => assert_eq!(joined, name),
        other => panic!("expected joined, got {:?}", other),
    }
}

async fn wait_for_online(hub: &ChatHub, count: usize) {
    for _ in 0..100 {
        if hub.online_count().await == count {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("online count never reached {}", count);
}

#[tokio::test]
async fn test_chat_round_trip() {
    let _ = tracing_subscriber::fmt::try_init();
    let (url, hub) = start_server(ChatConfig::default()).await;

    let mut alice = connect(&url).await;
    join(&mut alice, "alice", 0).await;
    match next_message(&mut alice).await {
        ServerMessage::Event { message } => {
            assert_eq!(message.kind, MessageKind::JoinNotice);
            assert_eq!(message.author, "alice");
        }
        other => panic!("expected join notice, got {:?}", other),
    }

    let mut bob = connect(&url).await;
    send(&mut bob, json!({"type": "join", "payload": {"name": "alice", "avatar": 1}})).await;
    match next_message(&mut bob).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "name_taken"),
        other => panic!("expected name_taken, got {:?}", other),
    }
    join(&mut bob, "bob", 1).await;

    send(&mut alice, json!({"type": "send", "payload": {"text": "  hi bob  "}})).await;

    let mut kinds = Vec::new();
    while kinds.len() < 2 {
        if let ServerMessage::Event { message } = next_message(&mut bob).await {
            kinds.push((message.kind, message.text.clone()));
        }
    }
    assert_eq!(kinds[0], (MessageKind::JoinNotice, "bob has joined the chat.".to_string()));
    assert_eq!(kinds[1], (MessageKind::Chat, "hi bob".to_string()));

    send(&mut bob, json!({"type": "leave"})).await;
    wait_for_online(&hub, 1).await;

    let mut saw_leave = false;
    while !saw_leave {
        if let ServerMessage::Event { message } = next_message(&mut alice).await {
            saw_leave = message.kind == MessageKind::LeaveNotice;
        }
    }
}

#[tokio::test]
async fn test_validation_and_malformed_frames() {
    let (url, hub) = start_server(ChatConfig::default()).await;
    let mut client = connect(&url).await;

    send(&mut client, json!({"type": "join", "payload": {"name": "   "}})).await;
    match next_message(&mut client).await {
        ServerMessage::Error { field, .. } => assert_eq!(field, Some(ValidationField::BlankName)),
        other => panic!("expected validation error, got {:?}", other),
    }

    send(&mut client, json!({"type": "join", "payload": {"name": "carol"}})).await;
    match next_message(&mut client).await {
        ServerMessage::Error { field, .. } => assert_eq!(field, Some(ValidationField::NoAvatarSelected)),
        other => panic!("expected validation error, got {:?}", other),
    }

    client.send(Message::Text("not json".into())).await.unwrap();
    match next_message(&mut client).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "invalid_format"),
        other => panic!("expected invalid_format, got {:?}", other),
    }

    send(&mut client, json!({"type": "send", "payload": {"text": "hello"}})).await;
    match next_message(&mut client).await {
        ServerMessage::Error { code, .. } => assert_eq!(code, "not_joined"),
        other => panic!("expected not_joined, got {:?}", other),
    }

    send(&mut client, json!({"type": "ping"})).await;
    assert!(matches!(next_message(&mut client).await, ServerMessage::Pong));
    assert_eq!(hub.registry.revision().await, 0);
}

#[tokio::test]
async fn test_disconnect_releases_session() {
    let (url, hub) = start_server(ChatConfig::default()).await;
    let mut client = connect(&url).await;
    join(&mut client, "dave", 2).await;
    wait_for_online(&hub, 1).await;

    drop(client);
    wait_for_online(&hub, 0).await;

    let mut again = connect(&url).await;
    join(&mut again, "dave", 0).await;
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let chat = ChatConfig {
        heartbeat_interval_secs: 1,
        client_timeout_secs: 0,
        ..ChatConfig::default()
    };
    let (url, hub) = start_server(chat).await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    let _welcome = client.next().await;
    send(&mut client, json!({"type": "join", "payload": {"name": "eve", "avatar": 0}})).await;
    wait_for_online(&hub, 1).await;

    // Stop reading so no pongs go back to the server.
    sleep(Duration::from_millis(1500)).await;
    wait_for_online(&hub, 0).await;
}
