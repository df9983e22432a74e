// Copyright (C) 2023 QuerentAI LLC.
// This file is part of Querent.

// The Licensed Work is licensed under the Business Source License 1.1 (BSL 1.1).
// You may use this file in compliance with the BSL 1.1, subject to the following restrictions:
// 1. You may not use the Licensed Work for AI-related services, database services,
//    or any service or product offering that provides database, big data, or analytics
//    services to third parties unless explicitly authorized by QuerentAI LLC.
// 2. For more details, see the LICENSE file or visit https://mariadb.com/bsl11/.

// For inquiries about alternative licensing arrangements, please contact contact@querent.xyz.

// The Licensed Work is provided "AS IS", WITHOUT WARRANTY OF ANY KIND, express or implied,
// including but not limited to the warranties of merchantability, fitness for a particular purpose,
// and non-infringement. See the Business Source License for more details.

// This software includes code developed by QuerentAI LLC (https://querent.xyz).

//! The reasoning-service adapter interface (C6). Narrowed from the
//! tensor/tokenization-heavy `LLM` trait this workspace's `llms` crate
//! exposes down to the chat-completion subset the turn engine actually
//! calls; `ReasoningError`'s kind-plus-source shape is carried over from
//! that crate's `LLMError`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{cancellation::CancellationToken, conversation::ConversationRecord, ids::AgentId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningErrorKind {
	Network,
	RateLimited,
	InvalidResponse,
	ContextLimitExceeded,
	Cancelled,
	Other,
}

#[derive(Clone, Debug)]
pub struct ReasoningError {
	pub kind: ReasoningErrorKind,
	pub source: Arc<anyhow::Error>,
}

impl ReasoningError {
	pub fn new(kind: ReasoningErrorKind, source: anyhow::Error) -> Self {
		ReasoningError { kind, source: Arc::new(source) }
	}

	pub fn cancelled() -> Self {
		ReasoningError::new(ReasoningErrorKind::Cancelled, anyhow::anyhow!("reasoning call cancelled"))
	}

	pub fn is_cancelled(&self) -> bool {
		self.kind == ReasoningErrorKind::Cancelled
	}
}

impl std::fmt::Display for ReasoningError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}: {}", self.kind, self.source)
	}
}

impl std::error::Error for ReasoningError {}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
	#[serde(rename = "promptTokens")]
	pub prompt_tokens: u32,
	#[serde(rename = "completionTokens")]
	pub completion_tokens: u32,
	#[serde(rename = "totalTokens")]
	pub total_tokens: u32,
}

/// A single tool the request makes available; the schema itself is carried
/// by [`crate::tools::ToolDef`] at the registry level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolChoice {
	pub name: String,
	pub description: String,
	pub parameters: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct ChatRequest {
	pub model: String,
	pub messages: Vec<ConversationRecord>,
	pub tools: Option<Vec<ToolChoice>>,
	pub temperature: Option<f32>,
	pub max_tokens: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct ChatResponse {
	pub content: Option<String>,
	pub tool_calls: Vec<crate::conversation::ToolCallRequest>,
	pub usage: Usage,
	pub reasoning: Option<String>,
}

impl ChatResponse {
	pub fn has_tool_calls(&self) -> bool {
		!self.tool_calls.is_empty()
	}
}

/// What a `chat` call resolved to — a plain result type would conflate "the
/// service returned `cancelled`" with a Rust-level cancellation, so this is
/// folded into [`ChatOutcome`] instead of `Result<ChatResponse, ReasoningError>`.
pub enum ChatOutcome {
	Completed(ChatResponse),
	Cancelled,
	Failed(ReasoningError),
}

/// Contract: `chat(request, cancellationToken) -> response | error`, with
/// mid-call cancellation support (§4.6). Concurrency per agent is exactly
/// one, enforced by C8, not by this trait.
#[async_trait]
pub trait ReasoningService: Send + Sync {
	async fn chat(&self, agent_id: &AgentId, request: ChatRequest, token: CancellationToken) -> ChatOutcome;

	/// Out-of-band cancellation, used by `abortAgentLlmCall` even when no
	/// suspension point is actively polling the token.
	async fn abort(&self, agent_id: &AgentId);
}
