//! Engine tests against a real local HTTP server speaking the
//! inference server's wire protocol.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use skiff_core::{
    ChatConfig, ChatEngine, ChatEvent, Role, TurnOutcome, ABORT_PLACEHOLDER, ERROR_PLACEHOLDER,
};

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> ChatConfig {
    ChatConfig {
        base_url: format!("http://{}", addr),
        ..ChatConfig::default()
    }
}

fn chat_record(content: &str) -> String {
    let mut record = json!({
        "model": "llama3.1",
        "message": {"role": "assistant", "content": content},
        "done": false
    })
    .to_string();
    record.push('\n');
    record
}

fn terminal_record() -> String {
    let mut record = json!({"model": "llama3.1", "done": true}).to_string();
    record.push('\n');
    record
}

/// Body that replays the given NDJSON text split into the given pieces,
/// so tests control exactly where chunk boundaries fall.
fn chunked_body(pieces: Vec<String>) -> Body {
    let chunks = pieces
        .into_iter()
        .map(Ok::<_, std::io::Error>)
        .collect::<Vec<_>>();
    Body::from_stream(futures::stream::iter(chunks))
}

async fn recv_until_finished(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let finished = matches!(event, ChatEvent::TurnFinished { .. });
        events.push(event);
        if finished {
            break;
        }
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streaming_turn_accumulates_across_chunk_boundaries() {
    // Record boundaries deliberately do not line up with chunk
    // boundaries: the first piece ends mid-record.
    let stream_text = format!(
        "{}{}{}",
        chat_record("Hel"),
        chat_record("lo"),
        terminal_record()
    );
    let split_at = stream_text.find("\"Hel\"").unwrap() + 3;
    let pieces = vec![
        stream_text[..split_at].to_string(),
        stream_text[split_at..].to_string(),
    ];

    let app = Router::new().route(
        "/api/chat",
        post(move || {
            let pieces = pieces.clone();
            async move { chunked_body(pieces).into_response() }
        }),
    );
    let addr = serve(app).await;

    let (tx_events, mut rx_events) = mpsc::unbounded_channel();
    let mut engine = ChatEngine::new(&config_for(addr), tx_events);

    let outcome = engine
        .send_message("hi", None, CancellationToken::new())
        .await;
    assert_eq!(outcome, TurnOutcome::Completed);

    let events = recv_until_finished(&mut rx_events).await;
    assert!(matches!(
        events.first(),
        Some(ChatEvent::TurnStarted { user_text, has_image: false }) if user_text == "hi"
    ));
    let last_progress = events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::Progress(progress) => Some(progress),
            _ => None,
        })
        .last()
        .expect("at least one progress update");
    assert_eq!(last_progress.text, "Hello");
    assert!(last_progress.chars_per_second.is_finite());
    assert!(matches!(
        events.last(),
        Some(ChatEvent::TurnFinished { outcome: TurnOutcome::Completed, text }) if text == "Hello"
    ));

    let turns: Vec<_> = engine.history().turns().collect();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text, "hi");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].text, "Hello");
}

#[derive(Clone, Default)]
struct VisionState {
    caption_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    captions_seen_at_chat: Arc<AtomicUsize>,
    caption_bodies: Arc<Mutex<Vec<Value>>>,
    chat_bodies: Arc<Mutex<Vec<Value>>>,
}

async fn caption_handler(State(state): State<VisionState>, Json(body): Json<Value>) -> Json<Value> {
    state.caption_calls.fetch_add(1, Ordering::SeqCst);
    state.caption_bodies.lock().await.push(body);
    Json(json!({
        "model": "minicpm-v",
        "response": "a small wooden boat",
        "done": true
    }))
}

async fn vision_chat_handler(State(state): State<VisionState>, Json(body): Json<Value>) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    state
        .captions_seen_at_chat
        .store(state.caption_calls.load(Ordering::SeqCst), Ordering::SeqCst);
    state.chat_bodies.lock().await.push(body);
    chunked_body(vec![chat_record("It is a boat."), terminal_record()]).into_response()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn image_send_captions_once_before_one_chat_call() {
    let state = VisionState::default();
    let app = Router::new()
        .route("/api/generate", post(caption_handler))
        .route("/api/chat", post(vision_chat_handler))
        .with_state(state.clone());
    let addr = serve(app).await;

    let (tx_events, mut rx_events) = mpsc::unbounded_channel();
    let mut engine = ChatEngine::new(&config_for(addr), tx_events);

    let image = b"fake image bytes".as_slice();
    let outcome = engine
        .send_message("what is this?", Some(image), CancellationToken::new())
        .await;
    assert_eq!(outcome, TurnOutcome::Completed);

    // Exactly one captioning call, strictly before exactly one chat call.
    assert_eq!(state.caption_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.chat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.captions_seen_at_chat.load(Ordering::SeqCst), 1);

    let caption_bodies = state.caption_bodies.lock().await;
    assert_eq!(caption_bodies[0]["model"], "minicpm-v");
    assert_eq!(caption_bodies[0]["prompt"], "what is this?");
    assert_eq!(caption_bodies[0]["stream"], false);
    assert_eq!(caption_bodies[0]["images"][0], BASE64.encode(image));

    // The chat request carries the composite prompt, not the raw text.
    let chat_bodies = state.chat_bodies.lock().await;
    let messages = chat_bodies[0]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0]["content"],
        "User uploaded an image with prompt: \"what is this?\", \
         answer the prompt with this info \"a small wooden boat\""
    );

    // The displayed turn keeps the typed text and the attachment.
    let events = recv_until_finished(&mut rx_events).await;
    assert!(matches!(
        events.first(),
        Some(ChatEvent::TurnStarted { user_text, has_image: true }) if user_text == "what is this?"
    ));
    let turns: Vec<_> = engine.history().turns().collect();
    assert_eq!(turns[0].text, "what is this?");
    assert_eq!(turns[0].image.as_deref(), Some(BASE64.encode(image).as_str()));
    assert_eq!(turns[1].text, "It is a boat.");
}

#[derive(Clone, Default)]
struct StallState {
    // Keeps the senders alive so the response streams never complete.
    holders: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
}

async fn stalling_chat_handler(State(state): State<StallState>) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    tx.send(chat_record("Never finished")).unwrap();
    state.holders.lock().await.push(tx);

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, std::io::Error>);
    Body::from_stream(stream).into_response()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abort_mid_stream_finalizes_placeholder_turn() {
    let state = StallState::default();
    let app = Router::new()
        .route("/api/chat", post(stalling_chat_handler))
        .with_state(state);
    let addr = serve(app).await;

    let (tx_events, mut rx_events) = mpsc::unbounded_channel();
    let mut engine = ChatEngine::new(&config_for(addr), tx_events);
    let cancel = CancellationToken::new();

    let turn = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let outcome = engine.send_message("hi", None, cancel).await;
            (outcome, engine)
        }
    });

    // Abort only once the stream has demonstrably started.
    loop {
        match rx_events.recv().await.expect("events stay open") {
            ChatEvent::Progress(progress) => {
                assert_eq!(progress.text, "Never finished");
                break;
            }
            _ => continue,
        }
    }
    cancel.cancel();

    let (outcome, engine) = tokio::time::timeout(Duration::from_secs(5), turn)
        .await
        .expect("abort unwinds promptly")
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Aborted);

    // The aborted turn is distinguishable from a completed one.
    let turns: Vec<_> = engine.history().turns().collect();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].text, ABORT_PLACEHOLDER);

    let events = recv_until_finished(&mut rx_events).await;
    assert!(matches!(
        events.last(),
        Some(ChatEvent::TurnFinished { outcome: TurnOutcome::Aborted, text }) if text == ABORT_PLACEHOLDER
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chat_server_error_settles_as_failed_placeholder() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
    );
    let addr = serve(app).await;

    let (tx_events, mut rx_events) = mpsc::unbounded_channel();
    let mut engine = ChatEngine::new(&config_for(addr), tx_events);

    let outcome = engine
        .send_message("hi", None, CancellationToken::new())
        .await;
    assert_eq!(outcome, TurnOutcome::Failed);

    let turns: Vec<_> = engine.history().turns().collect();
    assert_eq!(turns[0].text, "hi");
    assert_eq!(turns[1].text, ERROR_PLACEHOLDER);

    let events = recv_until_finished(&mut rx_events).await;
    assert!(matches!(
        events.last(),
        Some(ChatEvent::TurnFinished { outcome: TurnOutcome::Failed, text }) if text == ERROR_PLACEHOLDER
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn caption_failure_settles_without_reaching_chat() {
    let chat_calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "vision model missing") }),
        )
        .route(
            "/api/chat",
            post({
                let chat_calls = chat_calls.clone();
                move || {
                    chat_calls.fetch_add(1, Ordering::SeqCst);
                    async { chunked_body(vec![terminal_record()]).into_response() }
                }
            }),
        );
    let addr = serve(app).await;

    let (tx_events, _rx_events) = mpsc::unbounded_channel();
    let mut engine = ChatEngine::new(&config_for(addr), tx_events);

    let outcome = engine
        .send_message("what is this?", Some(b"img".as_slice()), CancellationToken::new())
        .await;

    assert_eq!(outcome, TurnOutcome::Failed);
    assert_eq!(chat_calls.load(Ordering::SeqCst), 0);
    let turns: Vec<_> = engine.history().turns().collect();
    assert_eq!(turns[1].text, ERROR_PLACEHOLDER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_models_reports_server_listing() {
    let app = Router::new().route(
        "/api/tags",
        get(|| async {
            Json(json!({
                "models": [
                    {"name": "llama3.1", "size": 4661224676u64},
                    {"name": "minicpm-v"}
                ]
            }))
        }),
    );
    let addr = serve(app).await;

    let (tx_events, mut rx_events) = mpsc::unbounded_channel();
    let engine = ChatEngine::new(&config_for(addr), tx_events);

    engine.refresh_models().await;

    match rx_events.recv().await.unwrap() {
        ChatEvent::Models(models) => {
            let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names, vec!["llama3.1", "minicpm-v"]);
        }
        other => panic!("expected model listing, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn next_send_context_is_history_plus_new_user_turn() {
    let state = VisionState::default();
    let app = Router::new()
        .route("/api/chat", post(vision_chat_handler))
        .with_state(state.clone());
    let addr = serve(app).await;

    let (tx_events, _rx_events) = mpsc::unbounded_channel();
    let mut engine = ChatEngine::new(&config_for(addr), tx_events);

    engine
        .send_message("first", None, CancellationToken::new())
        .await;
    engine
        .send_message("second", None, CancellationToken::new())
        .await;

    let chat_bodies = state.chat_bodies.lock().await;
    let second_context = chat_bodies[1]["messages"].as_array().unwrap();
    let roles: Vec<_> = second_context
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    let contents: Vec<_> = second_context
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();

    assert_eq!(roles, vec!["user", "assistant", "user"]);
    assert_eq!(contents, vec!["first", "It is a boat.", "second"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn model_switch_clears_history() {
    let state = VisionState::default();
    let app = Router::new()
        .route("/api/chat", post(vision_chat_handler))
        .with_state(state);
    let addr = serve(app).await;

    let (tx_events, mut rx_events) = mpsc::unbounded_channel();
    let mut engine = ChatEngine::new(&config_for(addr), tx_events);

    engine
        .send_message("hello", None, CancellationToken::new())
        .await;
    assert_eq!(engine.history().len(), 2);

    engine.select_model("deepseek-coder-v2:lite");

    assert_eq!(engine.model(), "deepseek-coder-v2:lite");
    assert!(engine.history().is_empty());
    let events = {
        let mut events = Vec::new();
        while let Ok(event) = rx_events.try_recv() {
            events.push(event);
        }
        events
    };
    assert!(events.iter().any(|event| matches!(
        event,
        ChatEvent::ModelChanged { name } if name == "deepseek-coder-v2:lite"
    )));
}
