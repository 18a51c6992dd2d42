use career_planner::advisor::{Advisor, ChatSettings, QuickAction};
use career_planner::chat::Role;
use career_planner::panel::Panel;
use career_planner::completion::OpenAiClient;
use career_planner::profile::{Gender, Grade, Profile};
use career_planner::protocol::{ClientEvent, Phase, ServerEvent};
use career_planner::Session;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WELCOME: &str = "Welcome! You're in grade 11th, from Lincoln High in Ontario, and identify as Female. \
You mentioned you're interested in subjects like Science. Let's begin your planning journey!";

fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        let chunk = json!({"choices": [{"index": 0, "delta": {"content": delta}}]});
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn lincoln() -> Profile {
    Profile {
        grade: Some(Grade::Eleventh),
        school: "Lincoln High".to_string(),
        province: "Ontario".to_string(),
        gender: Some(Gender::Female),
        interests: vec!["Science".to_string()],
    }
}

fn session(server: &MockServer) -> (Session, UnboundedReceiver<ServerEvent>) {
    let backend = Arc::new(OpenAiClient::new(format!("{}/v1", server.uri()), "test-key"));
    let settings = ChatSettings {
        model: "gpt-4o".to_string(),
        emit_interval: Duration::ZERO,
        ..ChatSettings::default()
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session::new(Arc::new(Advisor::new(backend, settings)), Duration::ZERO, tx);
    (session, rx)
}

fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn mount_reply(server: &MockServer, status: u16, body: String) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

#[test_log::test(tokio::test)]
async fn test_profile_then_chat_round_trip() {
    let server = MockServer::start().await;
    mount_reply(&server, 200, sse_body(&["Consider ", "biology."])).await;

    let (mut session, mut rx) = session(&server);

    session.handle(ClientEvent::Start { profile: lincoln() }).await.unwrap();
    let events = drain(&mut rx);
    match &events[1] {
        ServerEvent::Transcript { turns, .. } => {
            assert_eq!(turns[0].user, None);
            assert_eq!(turns[0].assistant, WELCOME);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(session.phase(), Phase::Chat);

    session
        .handle(ClientEvent::Send {
            text: "What should I study?".to_string(),
        })
        .await
        .unwrap();

    let history = session.close().await;
    let history = history.messages();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].role, Role::User);
    assert_eq!(history[1].content, "What should I study?");
    assert_eq!(history[2].role, Role::Assistant);
    assert!(history[2].content.starts_with("Consider biology. (First Chunk: "));
    assert!(history[2].content.contains(", Total: "));

    let events = drain(&mut rx);
    match events.last().unwrap() {
        ServerEvent::Transcript { turns, streaming } => {
            assert!(!streaming);
            // the welcome bubble is replaced by the first real exchange
            assert_eq!(turns.len(), 1);
            assert_eq!(turns[0].user.as_deref(), Some("What should I study?"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(events[..events.len() - 1]
        .iter()
        .all(|e| matches!(e, ServerEvent::Transcript { streaming: true, .. })));

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1], json!({"role": "user", "content": WELCOME}));
    assert_eq!(body["messages"][2], json!({"role": "user", "content": "What should I study?"}));
}

#[tokio::test]
async fn test_quick_action_sends_canned_prompt() {
    let server = MockServer::start().await;
    mount_reply(&server, 200, sse_body(&["Try McGill."])).await;

    let (mut session, _rx) = session(&server);
    session
        .handle(ClientEvent::QuickAction {
            action: QuickAction::RecommendSchools,
        })
        .await
        .unwrap();

    let history = session.close().await;
    assert_eq!(
        history.messages()[0].content,
        "Can you recommend some schools based on my profile?"
    );
}

#[tokio::test]
async fn test_upstream_failure_is_published_and_keeps_history() {
    let server = MockServer::start().await;
    mount_reply(&server, 500, "boom".to_string()).await;

    let (mut session, mut rx) = session(&server);
    session.handle(ClientEvent::Start { profile: lincoln() }).await.unwrap();
    drain(&mut rx);

    session.handle(ClientEvent::Send { text: "hi".to_string() }).await.unwrap();
    let history = session.close().await;
    assert_eq!(history.len(), 1);

    match &drain(&mut rx)[..] {
        [ServerEvent::Error { message }] => assert!(message.contains("500")),
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_reply_appends_nothing() {
    let server = MockServer::start().await;
    mount_reply(&server, 200, sse_body(&[])).await;

    let (mut session, mut rx) = session(&server);
    session.handle(ClientEvent::Send { text: "hello".to_string() }).await.unwrap();

    assert!(session.close().await.is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_queued_messages_are_answered_in_order() {
    let server = MockServer::start().await;
    mount_reply(&server, 200, sse_body(&["ok"])).await;

    let (mut session, _rx) = session(&server);
    for text in ["first", "second", "third"] {
        session.handle(ClientEvent::Send { text: text.to_string() }).await.unwrap();
    }

    let history = session.close().await;
    let users: Vec<_> = history
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(users, ["first", "second", "third"]);
    assert_eq!(history.len(), 6);

    // each request carries the exchanges committed before it
    let received = server.received_requests().await.unwrap();
    let last: serde_json::Value = serde_json::from_slice(&received[2].body).unwrap();
    assert_eq!(last["messages"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_panel_events_answer_while_reply_streams() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sse_body(&["slow"]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let (mut session, mut rx) = session(&server);
    timeout(
        Duration::from_millis(500),
        session.handle(ClientEvent::Send { text: "hi".to_string() }),
    )
    .await
    .expect("send should only queue the message")
    .unwrap();
    session
        .handle(ClientEvent::SelectPanel { panel: Panel::Program })
        .await
        .unwrap();

    let first = timeout(Duration::from_millis(500), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(first, ServerEvent::Panel { .. }), "got {:?}", first);

    let history = session.close().await;
    assert_eq!(history.len(), 2);
}
