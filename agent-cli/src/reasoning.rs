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

//! A reasoning-service adapter that talks to no model at all: it reflects
//! the last user turn back verbatim. The real C6 adapter — a client for
//! whichever chat-completion API `RuntimeConfig::reasoning_services` points
//! at — is an external collaborator outside this workspace's scope; this
//! loopback keeps `agent-cli serve` runnable without one.

use agent_core::{
	cancellation::CancellationToken, reasoning::Usage, AgentId, ChatOutcome, ChatRequest, ChatResponse, ReasoningService,
};
use async_trait::async_trait;

#[derive(Default)]
pub struct LoopbackReasoningService;

#[async_trait]
impl ReasoningService for LoopbackReasoningService {
	async fn chat(&self, _agent_id: &AgentId, request: ChatRequest, token: CancellationToken) -> ChatOutcome {
		if token.is_cancelled() {
			return ChatOutcome::Cancelled;
		}
		let last_user_turn = request
			.messages
			.iter()
			.rev()
			.find(|record| matches!(record.role, agent_core::ConversationRole::User))
			.map(|record| record.content.clone())
			.unwrap_or_default();
		let content = format!("(loopback) {last_user_turn}");
		ChatOutcome::Completed(ChatResponse {
			usage: Usage {
				prompt_tokens: agent_core::estimate_tokens(&last_user_turn),
				completion_tokens: agent_core::estimate_tokens(&content),
				total_tokens: 0,
			},
			content: Some(content),
			tool_calls: Vec::new(),
			reasoning: None,
		})
	}

	async fn abort(&self, _agent_id: &AgentId) {}
}

#[cfg(test)]
mod tests {
	use agent_core::ConversationRecord;

	use super::*;

	#[tokio::test]
	async fn test_loopback_echoes_last_user_turn() {
		let service = LoopbackReasoningService;
		let request = ChatRequest {
			model: "loopback".to_string(),
			messages: vec![ConversationRecord::system("sys"), ConversationRecord::user("hi there")],
			tools: None,
			temperature: None,
			max_tokens: None,
		};
		let token = agent_core::CancellationRegistry::new().token_for(&AgentId::new());
		match service.chat(&AgentId::new(), request, token).await {
			ChatOutcome::Completed(resp) => assert_eq!(resp.content.as_deref(), Some("(loopback) hi there")),
			_ => panic!("expected a completed outcome"),
		}
	}
}
