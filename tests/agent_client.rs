use futures::StreamExt;
use mirror_debate_gateway::GatewayError;
use mirror_debate_gateway::agent::{AgentRequest, AgentSettings, AgentTransport, HttpAgentClient};
use mirror_debate_gateway::stream::UiMessageChunk;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CAPTURED_STREAM: &str = concat!(
    "data: {\"id\":\"m1\",\"role\":\"assistant\",\"parts\":[{\"type\":\"text\",\"text\":\"Funding is\",\"state\":\"streaming\"}]}\n\n",
    "data: {\"id\":\"t1\",\"role\":\"assistant\",\"parts\":[{\"type\":\"tool-get_funding_rate\",\"toolCallId\":\"call-1\",\"state\":\"input-available\",\"input\":{\"symbol\":\"BTC\"}}]}\n\n",
    "data: {\"id\":\"t1\",\"role\":\"assistant\",\"parts\":[{\"type\":\"tool-get_funding_rate\",\"toolCallId\":\"call-1\",\"state\":\"input-available\",\"input\":{\"symbol\":\"BTC\"}}]}\n\n",
    "data: {\"id\":\"t1\",\"role\":\"assistant\",\"parts\":[{\"type\":\"tool-get_funding_rate\",\"toolCallId\":\"call-1\",\"state\":\"output-available\",\"input\":{\"symbol\":\"BTC\"},\"output\":{\"rate\":0.0001}}]}\n\n",
    "data: {\"id\":\"m1\",\"role\":\"assistant\",\"parts\":[{\"type\":\"text\",\"text\":\"Funding is flat.\",\"state\":\"done\"}]}\n\n",
    "data: [DONE]\n\n",
);

fn client_for(server: &MockServer) -> HttpAgentClient {
    HttpAgentClient::new(AgentSettings::new(server.uri()))
}

async fn collect_chunks(client: &HttpAgentClient) -> Vec<UiMessageChunk> {
    let stream = client
        .stream(AgentRequest::from_message("Is funding overheated?"))
        .await
        .expect("stream should open");
    stream.map(|item| item.expect("chunk")).collect().await
}

#[tokio::test]
async fn stream_translates_captured_sse() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/agent/stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(CAPTURED_STREAM, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let chunks = collect_chunks(&client_for(&server)).await;
    let kinds: Vec<_> = chunks.iter().map(UiMessageChunk::kind).collect();
    assert_eq!(
        kinds,
        vec![
            "start",
            "text-start",
            "text-delta",
            "tool-input-available",
            "tool-output-available",
            "text-delta",
            "text-end",
            "finish",
        ]
    );

    let text: String = chunks
        .iter()
        .filter_map(|c| match c {
            UiMessageChunk::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Funding is flat.");
}

#[tokio::test]
async fn two_streams_over_same_bytes_are_identical() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/agent/stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(CAPTURED_STREAM, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (first, second) = tokio::join!(collect_chunks(&client), collect_chunks(&client));
    assert_eq!(first, second);
}

#[tokio::test]
async fn stream_error_status_carries_body_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/agent/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .stream(AgentRequest::from_message("hi"))
        .await
        .err()
        .expect("500 must fail");
    assert_eq!(err.to_string(), "boom");
    assert!(matches!(err, GatewayError::Upstream { status: 500, .. }));
}

#[tokio::test]
async fn stream_without_body_is_missing_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/agent/stream"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .stream(AgentRequest::from_message("hi"))
        .await
        .err()
        .expect("empty body must fail");
    assert!(matches!(err, GatewayError::MissingBody));
}

#[tokio::test]
async fn send_keeps_only_completed_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                { "id": "a", "role": "assistant", "parts": [{ "type": "text", "text": "Bull case", "state": "done" }] },
                { "id": "b", "role": "assistant", "parts": [{ "type": "text", "text": "Bear", "state": "streaming" }] },
                { "id": "c", "role": "assistant", "parts": [
                    { "type": "tool-get_price", "toolCallId": "x", "state": "output-available", "output": 1 },
                    { "type": "text", "text": "Verdict", "state": "done" }
                ] }
            ]
        })))
        .mount(&server)
        .await;

    let turns = client_for(&server)
        .send(AgentRequest::from_message("hi"))
        .await
        .expect("send");
    let ids: Vec<_> = turns.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(turns[1].text(), "Verdict");
}

#[tokio::test]
async fn send_error_status_carries_body_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/agent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .send(AgentRequest::from_message("hi"))
        .await
        .expect_err("500 must fail");
    assert_eq!(err.to_string(), "boom");
}

#[tokio::test]
async fn request_body_carries_defaults_and_caller_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/agent"))
        .and(body_partial_json(json!({
            "message": "hi",
            "session_id": "s-1",
            "toolkits": ["crypto"],
            "timeout": 90.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "events": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = AgentSettings::new(server.uri());
    settings.default_toolkits = vec!["crypto".into()];
    settings.timeout_secs = Some(90.0);
    let client = HttpAgentClient::new(settings);

    let mut req = AgentRequest::from_message("hi");
    req.session_id = Some("s-1".into());
    let turns = client.send(req).await.expect("send");
    assert!(turns.is_empty());
}

#[tokio::test]
async fn invalid_request_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .send(AgentRequest::default())
        .await
        .expect_err("empty request must fail");
    assert!(matches!(err, GatewayError::InvalidRequest(_)));
}
