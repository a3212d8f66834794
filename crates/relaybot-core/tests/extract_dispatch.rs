//! End-to-end checks of the reply → extractor → dispatcher path.

use std::sync::Arc;

use relaybot_core::channel::dingtalk::DingTalkChannel;
use relaybot_core::config::{DingTalkConfig, ToolsConfig};
use relaybot_core::tool::{extract_tool_call, Dispatcher, Params, ToolOutcome};
use serde_json::{json, Value};

fn dispatcher(tools: &ToolsConfig) -> Dispatcher {
    Dispatcher::new(tools, Arc::new(DingTalkChannel::new(DingTalkConfig::default())))
}

fn params(v: Value) -> Params {
    serde_json::from_value(v).unwrap()
}

#[test]
fn test_plain_replies_have_no_tool_call() {
    for reply in [
        "",
        "The weather in Beijing is sunny today.",
        "Sure! I can help with that.",
        "[1, 2, 3]",
        "Use {braces} sparingly",
    ] {
        assert!(extract_tool_call(reply).is_none(), "{reply:?}");
    }
}

#[test]
fn test_bare_object_is_extracted() {
    let inv = extract_tool_call(r#"{"action": "get_weather", "parameters": {"city": "Beijing"}}"#)
        .unwrap();
    assert_eq!(inv.action, "get_weather");
    assert_eq!(inv.parameters["city"], "Beijing");
}

#[test]
fn test_fenced_object_is_extracted() {
    let reply = "```json\n{\"action\":\"calculator\",\"parameters\":{\"expression\":\"1+1\"}}\n```";
    let inv = extract_tool_call(reply).unwrap();
    assert_eq!(inv.action, "calculator");
    assert_eq!(inv.parameters["expression"], "1+1");
}

#[test]
fn test_malformed_instructions_are_ignored() {
    assert!(extract_tool_call("```json\n{\"action\": \"calculator\", \n```").is_none());
    assert!(extract_tool_call(r#"{"action": "calculator"}"#).is_none());
}

#[tokio::test]
async fn test_unknown_action_is_reported_not_raised() {
    let d = dispatcher(&ToolsConfig::default());
    let outcome = d.dispatch("unknown_tool_xyz", &Params::new()).await;
    assert!(outcome.is_error());
    assert!(outcome.text().contains("unknown tool"));
}

#[tokio::test]
async fn test_extracted_calculator_call_dispatches() {
    let d = dispatcher(&ToolsConfig::default());
    let inv = extract_tool_call(
        "Let me work that out.\n```json\n{\"action\":\"calculator\",\"parameters\":{\"expression\":\"2+2*3\"}}\n```",
    )
    .unwrap();
    let outcome = d.dispatch_invocation(&inv).await;
    assert_eq!(outcome, ToolOutcome::Text("2+2*3 = 8".to_string()));
}

#[tokio::test]
async fn test_send_email_with_empty_recipient_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/smtp/email")
        .expect(0)
        .create_async()
        .await;

    let mut tools = ToolsConfig::default();
    tools.email.api_key = "xkeysib-test".to_string();
    tools.email.api_base = server.url();
    let d = dispatcher(&tools);

    let outcome = d
        .dispatch(
            "send_email",
            &params(json!({"to": "", "subject": "Hi", "body": "Hello"})),
        )
        .await;
    assert!(outcome.is_error());
    assert!(outcome.text().starts_with("Error: "));
    mock.assert_async().await;
}
