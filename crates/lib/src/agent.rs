//! Agent turn: load thread history, stream the model reply, append messages.
//! When the model returns tool_calls, we execute them and re-call the model until done.

use crate::llm::{ChatMessage, GaiaClient, GaiaError, ToolDefinition};
use crate::session::SessionStore;
use crate::tools::ToolExecutor;

const MAX_TOOL_LOOP: usize = 5;

const SYSTEM_PROMPT: &str =
    "You are a helpful agent that can interact on-chain using your wallet tools. \
     You reply to text messages, so keep answers short.";

/// Run one agent turn for a thread: stream the reply (on_chunk per content delta), execute any
/// tool calls, and re-call until the model stops asking for tools or the loop bound is hit.
/// Returns the final assistant text — possibly empty when the model produced none.
pub async fn run_turn(
    store: &SessionStore,
    thread_id: &str,
    client: &GaiaClient,
    model: &str,
    tools: Option<Vec<ToolDefinition>>,
    executor: Option<&dyn ToolExecutor>,
    mut on_chunk: Option<&mut (dyn FnMut(&str) + Send)>,
) -> Result<String, GaiaError> {
    let thread = store
        .get(thread_id)
        .await
        .ok_or_else(|| GaiaError::Api(format!("thread not found: {}", thread_id)))?;

    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    messages.extend(thread.messages.iter().cloned());

    let tools_ref = tools.as_ref();
    let mut loop_count = 0;
    let mut last_content;

    loop {
        // Stream only the first call; tool-result follow-ups are short.
        let use_stream = on_chunk.is_some() && loop_count == 0;
        let res = if use_stream {
            let cb = on_chunk.as_mut().unwrap();
            let mut delta_cb = |s: &str| cb(s);
            client
                .chat_stream(model, messages.clone(), tools_ref.cloned(), &mut delta_cb)
                .await?
        } else {
            client.chat(model, messages.clone(), tools_ref.cloned()).await?
        };
        last_content = res.content().to_string();
        let tool_calls = res.tool_calls().to_vec();

        let assistant_msg = ChatMessage {
            role: "assistant".to_string(),
            content: last_content.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls.clone())
            },
            tool_name: None,
        };
        store
            .append_message_full(
                thread_id,
                "assistant",
                &assistant_msg.content,
                assistant_msg.tool_calls.clone(),
                None,
            )
            .await
            .map_err(GaiaError::Api)?;

        if tool_calls.is_empty() {
            break;
        }

        loop_count += 1;
        if loop_count >= MAX_TOOL_LOOP {
            log::debug!("agent: max tool loop iterations reached");
            break;
        }

        let executor = match executor {
            Some(e) => e,
            None => {
                log::debug!("agent: tool_calls returned but no executor");
                break;
            }
        };

        messages.push(assistant_msg);
        for call in &tool_calls {
            let name = call.function.name.as_str();
            let result = match executor.execute(name, &call.function.arguments).await {
                Ok(out) => out,
                Err(e) => {
                    log::warn!("agent: tool {} failed: {}", name, e);
                    format!("error: {}", e)
                }
            };
            messages.push(ChatMessage {
                role: "tool".to_string(),
                content: result.clone(),
                tool_calls: None,
                tool_name: Some(name.to_string()),
            });
            store
                .append_message_full(thread_id, "tool", &result, None, Some(name.to_string()))
                .await
                .map_err(GaiaError::Api)?;
        }
    }

    Ok(last_content)
}
