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

//! Auto-compression (C5): a free function, not an actor. C8 calls it
//! synchronously while holding the agent's conversation mutex, so the
//! invariant "must not interleave with C8's append" (§4.5) is structural
//! rather than a separate lock discipline to get right.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
	cancellation::CancellationToken,
	conversation::{estimate_tokens, ConversationRecord, Role},
	ids::AgentId,
	reasoning::{ChatOutcome, ChatRequest, ReasoningService},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompressionConfig {
	/// Fraction of `context_limit.max_tokens` that triggers compression.
	pub threshold: f64,
	pub keep_recent_count: usize,
	pub summary_model: String,
	pub summary_max_tokens: u32,
	pub summary_timeout_secs: u64,
	pub context_limit_max_tokens: u32,
}

impl Default for CompressionConfig {
	fn default() -> Self {
		CompressionConfig {
			threshold: 0.85,
			keep_recent_count: 10,
			summary_model: "summary-default".to_string(),
			summary_max_tokens: 512,
			summary_timeout_secs: 60,
			context_limit_max_tokens: 128_000,
		}
	}
}

/// §4.5 step 1-3: decides whether compression should run at all, and if so
/// what to compress, without touching the reasoning service.
fn plan_compression(
	records: &[ConversationRecord],
	config: &CompressionConfig,
) -> Option<(Vec<ConversationRecord>, Vec<ConversationRecord>)> {
	let total_tokens: u64 = records.iter().map(|r| r.token_count as u64).sum();
	let ratio = total_tokens as f64 / config.context_limit_max_tokens as f64;
	if ratio < config.threshold {
		return None;
	}
	if records.len() < 1 + config.keep_recent_count + 1 {
		return None;
	}
	let cutoff = records.len() - config.keep_recent_count;
	if cutoff <= 1 {
		return None;
	}
	let to_compress = records[1..cutoff].to_vec();
	if to_compress.is_empty() {
		return None;
	}
	let recent = records[cutoff..].to_vec();
	Some((to_compress, recent))
}

fn render_transcript(records: &[ConversationRecord]) -> String {
	let mut out = String::new();
	for record in records {
		let role = match record.role {
			Role::System => "system",
			Role::User => "user",
			Role::Assistant => "assistant",
			Role::Tool => "tool",
		};
		out.push_str(role);
		out.push_str(": ");
		out.push_str(&record.content);
		out.push('\n');
	}
	out
}

/// Runs §4.5's algorithm against `records`, returning the replacement list
/// if compression fired, or `None` if it was a no-op (below threshold, too
/// short, nothing to compress, or the summarization call itself failed).
pub async fn maybe_compress(
	agent_id: &AgentId,
	records: &[ConversationRecord],
	config: &CompressionConfig,
	reasoning: &dyn ReasoningService,
	token: CancellationToken,
) -> Option<Vec<ConversationRecord>> {
	let (to_compress, recent) = plan_compression(records, config)?;
	let system_entry = records[0].clone();
	let transcript = render_transcript(&to_compress);
	let request = ChatRequest {
		model: config.summary_model.clone(),
		messages: vec![ConversationRecord::user(format!(
			"Summarize the following conversation transcript concisely, preserving all \
			 decisions, facts, and open items:\n\n{transcript}"
		))],
		tools: None,
		temperature: Some(0.0),
		max_tokens: Some(config.summary_max_tokens),
	};
	let timeout = Duration::from_secs(config.summary_timeout_secs);
	let outcome = tokio::time::timeout(timeout, reasoning.chat(agent_id, request, token)).await;
	let summary_text = match outcome {
		Ok(ChatOutcome::Completed(response)) => match response.content {
			Some(text) if !text.trim().is_empty() => text,
			_ => {
				warn!(%agent_id, "compression produced empty summary, skipping");
				return None;
			},
		},
		Ok(ChatOutcome::Cancelled) => {
			warn!(%agent_id, "compression cancelled, skipping");
			return None;
		},
		Ok(ChatOutcome::Failed(err)) => {
			warn!(%agent_id, error = %err, "compression call failed, skipping");
			return None;
		},
		Err(_) => {
			warn!(%agent_id, "compression timed out, skipping");
			return None;
		},
	};
	let summary_content = format!("[compressed summary]\n{summary_text}");
	let summary_entry =
		ConversationRecord::compressed_summary(summary_content, estimate_tokens(&summary_text));
	info!(%agent_id, compressed = to_compress.len(), "conversation compressed");
	let mut new_list = Vec::with_capacity(2 + recent.len());
	new_list.push(system_entry);
	new_list.push(summary_entry);
	new_list.extend(recent);
	Some(new_list)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(role: Role, content: &str, tokens: u32) -> ConversationRecord {
		ConversationRecord {
			role,
			content: content.to_string(),
			tool_calls: None,
			tool_call_id: None,
			token_count: tokens,
			is_compressed: false,
			timestamp: chrono::Utc::now(),
		}
	}

	#[test]
	fn test_plan_compression_below_threshold_is_noop() {
		let config = CompressionConfig::default();
		let records: Vec<_> = (0..20).map(|i| record(Role::User, &format!("m{i}"), 10)).collect();
		assert!(plan_compression(&records, &config).is_none());
	}

	#[test]
	fn test_plan_compression_boundary_exactly_compresses_one() {
		let config = CompressionConfig { keep_recent_count: 10, threshold: 0.85, ..Default::default() };
		// length = 1 (system) + keepRecentCount + 1 = 12
		let mut records = vec![record(Role::System, "sys", 1000)];
		for i in 0..11 {
			records.push(record(Role::User, &format!("m{i}"), 10_000));
		}
		let plan = plan_compression(&records, &config);
		let (to_compress, recent) = plan.expect("should trigger at boundary");
		assert_eq!(to_compress.len(), 1);
		assert_eq!(recent.len(), config.keep_recent_count);
	}

	#[test]
	fn test_plan_compression_too_short_is_noop() {
		let config = CompressionConfig::default();
		let records = vec![record(Role::System, "sys", 200_000), record(Role::User, "hi", 200_000)];
		assert!(plan_compression(&records, &config).is_none());
	}
}
