use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::agent::AgentReply;
use crate::service::http::AppState;
use crate::tool::storage::object_key;
use crate::tool::{BinaryOutput, ToolOutcome};
use crate::types::OutboundMessage;

/// Post text to the group, prefixed and mentioning `at_user_ids`.
/// Delivery failures are logged, never propagated.
pub async fn send_reply(state: &AppState, text: &str, at_user_ids: &[String]) {
    if !state.channel.is_configured() {
        warn!("Dropping reply, {} channel is not configured: {}", state.channel.name(), text);
        return;
    }
    let content = format!("{}{}", state.config.dingtalk.reply_prefix, text);
    let msg = OutboundMessage::reply(content, at_user_ids);
    if let Err(e) = state.channel.send(&msg).await {
        error!("Failed to post reply via {}: {}", state.channel.name(), e);
    }
}

/// Run one LLM request in the background and post its result.
///
/// The task is registered before spawning so it is visible in the task
/// listing immediately; the guard moves into the task and unregisters it
/// when the task ends.
pub fn spawn_llm_task(
    state: Arc<AppState>,
    conversation_id: String,
    prompt: String,
    at_user_ids: Vec<String>,
) -> JoinHandle<()> {
    let guard = state.tasks.start(&conversation_id, &prompt);
    tokio::spawn(async move {
        let _guard = guard;
        let started = std::time::Instant::now();

        let mut memory = state.agent.new_memory();
        match state.agent.respond(&mut memory, &prompt).await {
            Ok(AgentReply::Tool {
                outcome: ToolOutcome::Binary(output),
                ..
            }) => deliver_binary(&state, output, &at_user_ids).await,
            Ok(reply) => send_reply(&state, reply.text(), &at_user_ids).await,
            Err(e) => {
                warn!("LLM request for {} failed: {}", conversation_id, e);
                send_reply(
                    &state,
                    &format!("Sorry, processing failed: {e}"),
                    &at_user_ids,
                )
                .await;
            }
        }

        info!(
            "LLM request for {} finished in {:.1}s",
            conversation_id,
            started.elapsed().as_secs_f64()
        );
    })
}

/// Deliver a generated file: object storage link if configured, otherwise a
/// file message through the channel.
async fn deliver_binary(state: &AppState, output: BinaryOutput, at_user_ids: &[String]) {
    let (true, Some(data)) = (output.success, output.payload) else {
        send_reply(state, &output.message, at_user_ids).await;
        return;
    };

    if state.storage.is_configured() {
        let key = object_key(&output.file_name);
        match state.storage.upload(&key, data, "application/pdf").await {
            Ok(url) => {
                let text = format!("{}\nDownload: {}", output.message, url);
                send_reply(state, &text, at_user_ids).await;
            }
            Err(e) => {
                warn!("Report upload failed: {}", e);
                send_reply(
                    state,
                    &format!("Error: report generated but upload failed: {e}"),
                    at_user_ids,
                )
                .await;
            }
        }
        return;
    }

    match state
        .channel
        .send_file(&output.file_name, data, at_user_ids)
        .await
    {
        Ok(()) => send_reply(state, &output.message, at_user_ids).await,
        Err(e) => {
            warn!("Sending {} failed: {}", output.file_name, e);
            send_reply(
                state,
                &format!("Error: report generated but could not be sent: {e}"),
                at_user_ids,
            )
            .await;
        }
    }
}
