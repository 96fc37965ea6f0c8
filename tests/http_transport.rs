use serde_json::json;
use streamchat::config::Config;
use streamchat::events::{Transcript, Turn};
use streamchat::markdown::CmarkTransform;
use streamchat::session::{ChatSession, SubmitOutcome};
use streamchat::storage::{MemoryStore, TranscriptStore};
use streamchat::transport::HttpTransport;
use streamchat::view::{ChannelView, NodeContent, PlainView, ViewEvent};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ERROR_MESSAGE: &str = "Error: No se pudo conectar con el agente.";

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.endpoint = server.uri();
    config
}

fn session_for(config: &Config, store: &MemoryStore) -> ChatSession<HttpTransport, MemoryStore, CmarkTransform> {
    ChatSession::new(
        HttpTransport::new(config).unwrap(),
        TranscriptStore::new(store.clone(), "chatHistory"),
        CmarkTransform,
        ERROR_MESSAGE,
    )
}

fn stored(store: &MemoryStore) -> Transcript {
    TranscriptStore::new(store.clone(), "chatHistory")
        .load()
        .unwrap()
        .unwrap_or_default()
}

#[tokio::test]
async fn streamed_reply_is_rendered_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_json(json!({"user_message": "Hi", "history": []})))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello, world"))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let mut session = session_for(&config_for(&server), &store);
    let mut view = PlainView::new(Vec::new(), false);

    let outcome = session.submit(&mut view, "  Hi  ").await;
    assert_eq!(outcome, SubmitOutcome::Completed);
    assert_eq!(String::from_utf8(view.into_inner()).unwrap(), "Hello, world\n");
    assert_eq!(
        stored(&store),
        Transcript::from(vec![Turn::user("Hi"), Turn::agent("<p>Hello, world</p>\n")])
    );
}

#[tokio::test]
async fn second_request_carries_prior_turns_and_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(header("X-API-Key", "secret"))
        .and(body_json(json!({
            "user_message": "second",
            "history": [
                {"sender": "user", "text": "first"},
                {"sender": "agent", "text": "<p>ok</p>\n"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("again"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.api_key = Some("secret".to_string());
    let store = MemoryStore::new();
    let mut session = session_for(&config, &store);
    let (mut view, _events) = ChannelView::new();

    assert_eq!(session.submit(&mut view, "first").await, SubmitOutcome::Completed);
    assert_eq!(session.submit(&mut view, "second").await, SubmitOutcome::Completed);
    assert_eq!(stored(&store).len(), 4);
    assert_eq!(stored(&store).turns()[3], Turn::agent("<p>again</p>\n"));
}

#[tokio::test]
async fn server_error_shows_fallback_and_keeps_only_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let mut session = session_for(&config_for(&server), &store);
    let (mut view, mut events) = ChannelView::new();

    assert_eq!(session.submit(&mut view, "Hi").await, SubmitOutcome::Failed);
    assert_eq!(stored(&store), Transcript::from(vec![Turn::user("Hi")]));

    let mut last_append = None;
    while let Ok(event) = events.try_recv() {
        if let ViewEvent::Append { content, .. } = event {
            last_append = Some(content);
        }
    }
    assert_eq!(last_append, Some(NodeContent::Error(ERROR_MESSAGE.to_string())));
}

#[tokio::test]
async fn json_reply_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"agent_response": "**done**"})))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let mut session = session_for(&config_for(&server), &store);
    let (mut view, _events) = ChannelView::new();

    assert_eq!(session.submit(&mut view, "go").await, SubmitOutcome::Completed);
    assert_eq!(stored(&store).turns()[1], Turn::agent("<p><strong>done</strong></p>\n"));
}

#[tokio::test]
async fn unreachable_endpoint_fails_cleanly() {
    let mut config = Config::default();
    // Nothing listens on port 9 locally
    config.endpoint = "http://127.0.0.1:9".to_string();
    let store = MemoryStore::new();
    let mut session = session_for(&config, &store);
    let mut view = PlainView::new(Vec::new(), false);

    assert_eq!(session.submit(&mut view, "Hi").await, SubmitOutcome::Failed);
    assert_eq!(String::from_utf8(view.into_inner()).unwrap(), format!("{ERROR_MESSAGE}\n"));
}
