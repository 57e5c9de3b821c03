//! End-to-end runs of the websocket transport against a local server.

use std::sync::Arc;
use std::time::Duration;

use frames::{GenerationEvent, LiveEditorEvent, USER_CLOSE_CODE};
use futures_util::{SinkExt, StreamExt};
use pixelforge::channel::ws::WsConnector;
use pixelforge::channel::{Inbound, RetryPolicy, SessionChannel};
use pixelforge::dispatcher::{GenerationDispatcher, Outcome, Rollback};
use pixelforge::live_editor::LiveEditor;
use pixelforge::state::{AppPhase, AppState, SessionState};
use pixelforge::storage::MemoryStore;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

const SESSION: &str = "a1b2c3d4-e5f6-4a7b-8c9d-0e1f2a3b4c5d";

type ServerSocket = WebSocketStream<TcpStream>;

/// Accept one websocket client and hand it to `script`.
async fn serve_once<F, Fut, T>(script: F) -> (String, JoinHandle<T>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = T> + Send,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let ws = accept_async(tcp).await.expect("handshake");
        script(ws).await
    });
    (format!("ws://{addr}"), handle)
}

async fn read_request(ws: &mut ServerSocket) -> Value {
    loop {
        match ws.next().await.expect("request").expect("frame") {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("json request"),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.expect("send event");
}

fn app_state() -> AppState {
    AppState::new(SessionState::load(Box::new(MemoryStore::new())))
}

fn dispatcher() -> GenerationDispatcher {
    let config = pixelforge::config::ClientConfig::from_lookup(|_| None).expect("config");
    GenerationDispatcher::new(config.settings, config.variant_capacity)
}

#[tokio::test]
async fn generation_streams_then_completes_on_normal_close() {
    let (base, server) = serve_once(|mut ws| async move {
        let request = read_request(&mut ws).await;
        send_json(&mut ws, json!({ "type": "variantCount", "value": 2 })).await;
        send_json(&mut ws, json!({ "type": "chunk", "value": "<html>", "variantIndex": 0 })).await;
        send_json(&mut ws, json!({ "type": "chunk", "value": "</html>", "variantIndex": 0 })).await;
        send_json(&mut ws, json!({ "type": "status", "value": "Generating images...", "variantIndex": 1 })).await;
        send_json(&mut ws, json!({ "type": "variantComplete", "variantIndex": 0 })).await;
        send_json(&mut ws, json!({ "type": "variantError", "variantIndex": 1, "value": "timeout" })).await;
        let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
        ws.close(Some(frame)).await.expect("close");
        while let Some(Ok(_)) = ws.next().await {}
        request
    })
    .await;

    let mut state = app_state();
    let mut dispatcher = dispatcher();
    let mut channel =
        SessionChannel::<GenerationEvent>::new(format!("{base}/generate-code"), Arc::new(WsConnector), RetryPolicy::default());

    let ctx = dispatcher.create_from_text(&mut state, &mut channel, "a landing page").await.expect("create");
    let outcome = dispatcher.drive(&mut state, &mut channel, &ctx).await.expect("drive");

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(state.project.phase, AppPhase::CodeReady);
    let head = state.project.commits.head_commit().expect("head");
    assert_eq!(head.hash, ctx.commit);
    assert_eq!(head.variants.len(), 2);
    assert_eq!(head.variants[0].code, "<html></html>");
    assert_eq!(head.variants[1].error_message(), Some("timeout"));
    assert_eq!(state.project.console(1), ["Generating images...".to_owned()]);

    let request = tokio::time::timeout(Duration::from_secs(5), server).await.expect("server done").expect("join");
    assert_eq!(request["generationType"], "create");
    assert_eq!(request["inputMode"], "text");
    assert_eq!(request["prompt"]["text"], "a landing page");
    assert_eq!(request["generatedCodeConfig"], "html_tailwind");
}

#[tokio::test]
async fn cancel_sends_user_close_code_and_resets_first_version() {
    let (base, server) = serve_once(|mut ws| async move {
        read_request(&mut ws).await;
        send_json(&mut ws, json!({ "type": "chunk", "value": "<div", "variantIndex": 0 })).await;
        while let Some(message) = ws.next().await {
            if let Ok(Message::Close(frame)) = message {
                return frame.map(|f| u16::from(f.code));
            }
        }
        None
    })
    .await;

    let mut state = app_state();
    let mut dispatcher = dispatcher();
    let mut channel =
        SessionChannel::<GenerationEvent>::new(format!("{base}/generate-code"), Arc::new(WsConnector), RetryPolicy::default());

    let ctx = dispatcher.create_from_text(&mut state, &mut channel, "a pricing table").await.expect("create");
    let Inbound::Event(first) = channel.recv().await.expect("first event") else {
        panic!("expected an event before cancelling");
    };
    assert_eq!(dispatcher.apply(&mut state, &ctx, first), Outcome::Pending);

    dispatcher.cancel(&mut channel).await;
    let outcome = dispatcher.drive(&mut state, &mut channel, &ctx).await.expect("drive");

    assert_eq!(outcome, Outcome::Cancelled(Rollback::Reset));
    assert!(state.project.commits.is_empty());
    assert!(dispatcher.active().is_none());

    let code = tokio::time::timeout(Duration::from_secs(5), server).await.expect("server done").expect("join");
    assert_eq!(code, Some(USER_CLOSE_CODE));
}

#[tokio::test]
async fn live_editor_turn_round_trips() {
    let (base, server) = serve_once(|mut ws| async move {
        let instruction = read_request(&mut ws).await;
        send_json(&mut ws, json!({ "type": "chunk", "content": "Reading the header. " })).await;
        send_json(&mut ws, json!({ "type": "tool_use", "tool": "Edit", "input": { "file_path": "src/Header.tsx" } }))
            .await;
        send_json(&mut ws, json!({ "type": "tool_result", "content": "ok", "is_error": false })).await;
        send_json(&mut ws, json!({ "type": "complete", "session_id": SESSION })).await;
        instruction
    })
    .await;

    let mut session = SessionState::load(Box::new(MemoryStore::new()));
    session.set_project("/w/site", None).expect("project");
    let mut editor = LiveEditor::new(10);
    let mut channel =
        SessionChannel::<LiveEditorEvent>::new(format!("{base}/ws/live-editor"), Arc::new(WsConnector), RetryPolicy::default());

    editor.send_message(&session, &mut channel, "make the header sticky").await.expect("send");
    editor.drive(&mut session, &mut channel).await.expect("drive");
    channel.disconnect().await;

    assert!(!editor.is_streaming());
    assert_eq!(editor.timeline().len(), 3);
    let tool = editor.timeline().messages()[2].tool_activity.as_ref().expect("tool entry");
    assert_eq!(tool.describe(), "Edited src/Header.tsx");
    assert_eq!(session.session_id().map(|s| s.as_str()), Some(SESSION));

    let instruction = tokio::time::timeout(Duration::from_secs(5), server).await.expect("server done").expect("join");
    assert_eq!(instruction["message"], "make the header sticky");
    assert_eq!(instruction["project_path"], "/w/site");
    assert!(instruction.get("session_id").is_none());
}
