//! `POST /api/v1/process` (spec.md §4.6): the single request/response cycle
//! that turns one inbound Telegram message into zero or one replies.
//!
//! Mirrors the shape of `skynet-agent::pipeline::process`'s admit -> persist
//! -> build -> generate -> reply pipeline, generalized from a
//! session/channel-oriented chat loop to one admitted HTTP call per message.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::HeaderMap, Json};
use gryag_admission::Outcome;
use gryag_agent::context::CurrentMessage;
use gryag_agent::provider::{
    filter_unsupported_parts, ChatRequest, FinishReason, GenerationMode, Part, Role, Turn,
};
use gryag_agent::tools::build::build_tools;
use gryag_agent::tools::tool_loop::run_tool_loop;
use gryag_agent::tools::{catalog, to_schemas};
use gryag_core::types::{MediaKind, Role as CoreRole, UserRole};
use gryag_persistence::types::{MediaDescriptor, NewMessage};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::app::AppState;
use crate::lock_guard::ChatLockGuard;
use crate::locale::Localizer;

use super::types::{MediaDto, ProcessRequest, ProcessResponse};

pub async fn process_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ProcessRequest>,
) -> Json<ProcessResponse> {
    let correlation_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state.begin_request();
    let response = handle(&state, req, &correlation_id).await;
    state.end_request();
    Json(response)
}

async fn handle(state: &Arc<AppState>, req: ProcessRequest, correlation_id: &str) -> ProcessResponse {
    let cancel = CancellationToken::new();
    let deadline = Duration::from_secs(state.config.timeouts.request_deadline_secs);
    match tokio::time::timeout(deadline, admit_and_process(state, &req, correlation_id, &cancel)).await {
        Ok(response) => response,
        Err(_) => {
            cancel.cancel();
            warn!(correlation_id, "request exceeded deadline, cancelling");
            let localizer = Localizer::load(&state.config.locale.dir, &state.config.locale.default_language);
            ProcessResponse::default().with_error("timeout", localizer.provider_unavailable(correlation_id))
        }
    }
}

/// Admission wait, the exclusive chat lock, and generation all fall under
/// the one request deadline `handle` enforces (spec.md §5) — none of them
/// runs unbounded even though only the tool loop checks `cancel` directly.
async fn admit_and_process(
    state: &Arc<AppState>,
    req: &ProcessRequest,
    correlation_id: &str,
    cancel: &CancellationToken,
) -> ProcessResponse {
    let chat_id = req.chat.id;
    let user_id = req.user.id;
    let now = state.clock.now_unix();

    let outcome = state.limiter.0.admit(chat_id, user_id, state.clock.as_ref()).await;
    match outcome {
        Outcome::Allow => {}
        Outcome::ThrottleChat | Outcome::ThrottleUser => {
            let localizer = Localizer::load(&state.config.locale.dir, &state.config.locale.default_language);
            return if state.notify_suppression.should_notify(user_id, now, state.config.admission.notify_suppression_secs) {
                ProcessResponse::throttled_notice(localizer.throttle_notice())
            } else {
                ProcessResponse::throttled_silent()
            };
        }
        Outcome::BusyChat | Outcome::DuplicateInflight => {
            // Another admitted request already holds this chat's exclusive
            // lock — never worth a user-visible notice (spec.md §4.1).
            return ProcessResponse::throttled_silent();
        }
    }

    let guard = ChatLockGuard::new(Arc::clone(&state.limiter), chat_id);
    let response = process_admitted(state, req, user_id, now, correlation_id, cancel).await;
    guard.release().await;
    response
}

pub(crate) async fn process_admitted(
    state: &Arc<AppState>,
    req: &ProcessRequest,
    user_id: i64,
    now: i64,
    correlation_id: &str,
    cancel: &CancellationToken,
) -> ProcessResponse {
    let chat_id = req.chat.id;

    // A proactive-job nudge (spec.md §9) has no real inbound Telegram
    // message to persist — it goes straight to generation.
    if !req.triggers.system {
        let inbound_media = req.message.media.first().map(media_dto_to_descriptor);
        let new_message = NewMessage {
            chat_id,
            thread_id: req.chat.thread_id,
            external_message_id: Some(req.message.id),
            external_user_id: Some(user_id),
            role: CoreRole::User,
            text: req.message.text.clone(),
            media: inbound_media,
            reply_to_external_message_id: req.message.reply_to.as_ref().map(|r| r.message_id),
            reply_to_external_user_id: req.message.reply_to.as_ref().map(|r| r.user_id),
            created_at: req.message.date,
        };
        if let Err(e) = state.repository.insert_message(&new_message) {
            error!(chat_id, error = %e, "failed to persist inbound message");
            return ProcessResponse::default().with_error("persistence_unavailable", e.to_string());
        }
    }

    if !req.triggers.matches() {
        return ProcessResponse::default();
    }

    let role = if req.user.is_admin { UserRole::Admin } else { UserRole::User };
    let caps = state.agent.capabilities().await;
    let sandbox_executor = None;
    let tools = build_tools(
        &state.config,
        Arc::clone(&state.repository),
        state.agent.provider_arc(),
        Arc::clone(&state.clock),
        caps,
        sandbox_executor,
    );

    let attachments: Vec<String> = req
        .message
        .media
        .iter()
        .map(|m| m.caption.clone().unwrap_or_else(|| m.kind.clone()))
        .collect();
    const PROACTIVE_NUDGE_TEXT: &str =
        "[The chat has been quiet for a while. Only speak up if there is something genuinely \
         worth adding; otherwise stay silent.]";
    let speaker = if req.triggers.system { "system".to_string() } else { format!("user#{user_id}") };
    let current = CurrentMessage {
        speaker: &speaker,
        timestamp: req.message.date,
        text: if req.triggers.system {
            PROACTIVE_NUDGE_TEXT
        } else {
            req.message.text.as_deref().unwrap_or("")
        },
        attachments,
        reply_to: req.message.reply_to.as_ref().map(|r| r.message_id),
    };

    let instruction = match state.context_builder.build(
        chat_id,
        req.chat.thread_id,
        req.chat.title.as_deref(),
        &catalog(&tools),
        user_id,
        caps,
        &current,
        state.clock.as_ref(),
    ) {
        Ok(text) => text,
        Err(e) => {
            error!(chat_id, error = %e, "failed to build instruction context");
            return ProcessResponse::default().with_error("persistence_unavailable", e.to_string());
        }
    };

    let mut history = Vec::new();
    if let Some(reply) = &req.message.reply_to {
        let mut parts = Vec::new();
        if let Some(text) = &reply.text {
            parts.push(Part::text(text.clone()));
        }
        if let Some(media) = &reply.media {
            parts.push(media_dto_to_part(media));
        }
        if !parts.is_empty() {
            history.push(Turn { role: Role::User, parts });
        }
    }
    let mut current_parts = Vec::new();
    if req.triggers.system {
        current_parts.push(Part::text(PROACTIVE_NUDGE_TEXT));
    } else {
        if let Some(text) = &req.message.text {
            current_parts.push(Part::text(text.clone()));
        }
        for media in &req.message.media {
            current_parts.push(media_dto_to_part(media));
        }
    }
    if current_parts.is_empty() {
        current_parts.push(Part::text(""));
    }
    history.push(Turn { role: Role::User, parts: current_parts });

    filter_unsupported_parts(&mut history, caps);
    gryag_agent::media::cap_inline_media(
        &mut history,
        gryag_agent::media::DEFAULT_MAX_INLINE_ITEMS,
        gryag_agent::media::DEFAULT_MAX_INLINE_VIDEOS,
    );

    let request = ChatRequest {
        model: state.agent.model().await,
        system_instruction: instruction,
        history,
        tools: to_schemas(&tools),
        generation_mode: GenerationMode::Creative,
        max_output_tokens: state.config.agent.max_output_tokens,
    };

    let outcome = run_tool_loop(
        state.agent.provider(),
        request,
        &tools,
        &state.quotas,
        user_id,
        role,
        state.clock.as_ref(),
        state.config.agent.max_tool_turns,
        cancel,
        Duration::from_secs(state.config.timeouts.llm_call_timeout_secs),
    )
    .await;

    let localizer = Localizer::load(&state.config.locale.dir, &state.config.locale.default_language);

    let loop_outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(chat_id, error = %e, correlation_id, "LLM provider failed after retries");
            return ProcessResponse::default().with_error(
                gryag_core::CoreError::from(e).kind(),
                localizer.provider_unavailable(correlation_id),
            );
        }
    };

    if loop_outcome.completion.finish_reason == FinishReason::Safety {
        return ProcessResponse::reply(localizer.content_blocked());
    }

    let reply_text = crate::reply::to_telegram_markup(loop_outcome.completion.text.as_deref().unwrap_or(""));

    // A proactive nudge the model chose not to act on produces no reply
    // worth keeping in history (spec.md §9: "yields rather than preempts").
    if !reply_text.trim().is_empty() {
        let assistant_message = NewMessage {
            chat_id,
            thread_id: req.chat.thread_id,
            external_message_id: None,
            external_user_id: None,
            role: CoreRole::Assistant,
            text: Some(reply_text.clone()),
            media: None,
            reply_to_external_message_id: Some(req.message.id),
            reply_to_external_user_id: Some(user_id),
            created_at: now,
        };
        if let Err(e) = state.repository.insert_message(&assistant_message) {
            warn!(chat_id, error = %e, "failed to persist assistant reply");
        }
    }

    let mut response = ProcessResponse::reply(reply_text);
    if let Some(media) = loop_outcome.media_results.last() {
        if let Some(media_id) = media.get("media_id").and_then(|v| v.as_str()) {
            let kind = media
                .get("mime")
                .and_then(|v| v.as_str())
                .map(media_kind_for_mime)
                .unwrap_or("document");
            response = response.with_media(media_id.to_string(), kind);
        }
    }
    response
}

fn media_dto_to_descriptor(media: &MediaDto) -> MediaDescriptor {
    MediaDescriptor {
        kind: media.kind.parse().unwrap_or(MediaKind::Document),
        mime: media.mime.clone(),
        file_ref: media.file_ref.clone(),
        width: media.width,
        height: media.height,
        duration_secs: media.duration,
        caption: media.caption.clone(),
    }
}

fn media_dto_to_part(media: &MediaDto) -> Part {
    Part::FileRef {
        mime: media.mime.clone(),
        uri: media.file_ref.clone(),
        caption: media.caption.clone(),
    }
}

fn media_kind_for_mime(mime: &str) -> &'static str {
    match mime.split('/').next() {
        Some("image") => "photo",
        Some("audio") => "voice",
        Some("video") => "video",
        _ => "document",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_derives_from_mime_prefix() {
        assert_eq!(media_kind_for_mime("image/png"), "photo");
        assert_eq!(media_kind_for_mime("audio/ogg"), "voice");
        assert_eq!(media_kind_for_mime("video/mp4"), "video");
        assert_eq!(media_kind_for_mime("application/pdf"), "document");
    }
}
