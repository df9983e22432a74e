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

//! Per-agent conversation history (C4): an append-only ordered list with
//! token accounting, behind the same per-agent mutex the auto-compression
//! engine (C5) takes for the whole-list replace.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ids::AgentId, ports::PersistencePort};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	User,
	Assistant,
	Tool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRequest {
	pub id: String,
	pub name: String,
	pub args: serde_json::Value,
}

/// `{role, content, toolCalls?, toolCallId?, tokenCount}` from §3.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationRecord {
	pub role: Role,
	pub content: String,
	#[serde(rename = "toolCalls", skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCallRequest>>,
	#[serde(rename = "toolCallId", skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
	#[serde(rename = "tokenCount")]
	pub token_count: u32,
	#[serde(rename = "isCompressed", default, skip_serializing_if = "std::ops::Not::not")]
	pub is_compressed: bool,
	pub timestamp: DateTime<Utc>,
}

impl ConversationRecord {
	pub fn system(content: impl Into<String>) -> Self {
		let content = content.into();
		ConversationRecord {
			token_count: estimate_tokens(&content),
			role: Role::System,
			content,
			tool_calls: None,
			tool_call_id: None,
			is_compressed: false,
			timestamp: Utc::now(),
		}
	}

	pub fn user(content: impl Into<String>) -> Self {
		let content = content.into();
		ConversationRecord {
			token_count: estimate_tokens(&content),
			role: Role::User,
			content,
			tool_calls: None,
			tool_call_id: None,
			is_compressed: false,
			timestamp: Utc::now(),
		}
	}

	pub fn assistant_text(content: impl Into<String>, token_count: u32) -> Self {
		let content = content.into();
		ConversationRecord {
			token_count,
			role: Role::Assistant,
			content,
			tool_calls: None,
			tool_call_id: None,
			is_compressed: false,
			timestamp: Utc::now(),
		}
	}

	pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>, token_count: u32) -> Self {
		ConversationRecord {
			token_count,
			role: Role::Assistant,
			content: String::new(),
			tool_calls: Some(tool_calls),
			tool_call_id: None,
			is_compressed: false,
			timestamp: Utc::now(),
		}
	}

	pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
		let content = content.into();
		ConversationRecord {
			token_count: estimate_tokens(&content),
			role: Role::Tool,
			content,
			tool_calls: None,
			tool_call_id: Some(tool_call_id.into()),
			is_compressed: false,
			timestamp: Utc::now(),
		}
	}

	pub fn compressed_summary(content: impl Into<String>, token_count: u32) -> Self {
		ConversationRecord {
			token_count,
			role: Role::Assistant,
			content: content.into(),
			tool_calls: None,
			tool_call_id: None,
			is_compressed: true,
			timestamp: Utc::now(),
		}
	}
}

/// Heuristic token estimate used before the reasoning service has returned
/// an authoritative count, per §4.4: "mixed Chinese/English character
/// heuristic of ≈2.5–4 chars per token plus fixed per-message overhead".
/// CJK code points are weighted roughly 1 token per character; everything
/// else assumes ≈3.3 chars per token.
pub fn estimate_tokens(text: &str) -> u32 {
	const PER_MESSAGE_OVERHEAD: u32 = 4;
	const CHARS_PER_TOKEN: f64 = 3.3;

	let mut cjk_chars: u32 = 0;
	let mut other_chars: u32 = 0;
	for ch in text.chars() {
		if is_cjk(ch) {
			cjk_chars += 1;
		} else {
			other_chars += 1;
		}
	}
	let other_tokens = (other_chars as f64 / CHARS_PER_TOKEN).ceil() as u32;
	cjk_chars + other_tokens + PER_MESSAGE_OVERHEAD
}

fn is_cjk(ch: char) -> bool {
	let c = ch as u32;
	(0x4E00..=0x9FFF).contains(&c)
		|| (0x3400..=0x4DBF).contains(&c)
		|| (0x3040..=0x30FF).contains(&c)
		|| (0xAC00..=0xD7A3).contains(&c)
}

struct AgentConversation {
	records: Mutex<Vec<ConversationRecord>>,
}

/// Per-agent `Vec<ConversationRecord>` behind one mutex per agent, shared
/// with C5 so compression and turn appends never interleave (§4.5, §5).
#[derive(Default)]
pub struct ConversationStore {
	agents: Mutex<HashMap<AgentId, Arc<AgentConversation>>>,
	persistence: Option<Arc<dyn PersistencePort>>,
}

impl ConversationStore {
	pub fn new(persistence: Option<Arc<dyn PersistencePort>>) -> Self {
		ConversationStore { agents: Mutex::new(HashMap::new()), persistence }
	}

	/// Creates a fresh conversation seeded with the given system turn.
	/// `root` and `user` are still expected to call this once at startup so
	/// their first element can never be rewritten by compression (§3).
	pub fn register(&self, agent_id: AgentId, system_turn: ConversationRecord) {
		self.agents
			.lock()
			.unwrap()
			.entry(agent_id)
			.or_insert_with(|| Arc::new(AgentConversation { records: Mutex::new(vec![system_turn]) }));
	}

	/// Restores a conversation from a persisted tail, used by C9's `restore`.
	pub fn restore(&self, agent_id: AgentId, records: Vec<ConversationRecord>) {
		self.agents.lock().unwrap().insert(
			agent_id,
			Arc::new(AgentConversation { records: Mutex::new(records) }),
		);
	}

	pub fn remove(&self, agent_id: &AgentId) {
		self.agents.lock().unwrap().remove(agent_id);
	}

	fn handle_for(&self, agent_id: &AgentId) -> Option<Arc<AgentConversation>> {
		self.agents.lock().unwrap().get(agent_id).cloned()
	}

	pub fn append(&self, agent_id: &AgentId, record: ConversationRecord) {
		let Some(handle) = self.handle_for(agent_id) else { return };
		handle.records.lock().unwrap().push(record.clone());
		if let Some(persistence) = &self.persistence {
			persistence.append_conversation_record(agent_id, &record);
		}
	}

	/// Used only by C5: replaces the whole list under the same mutex an
	/// `append` would take, so the two never interleave.
	pub fn replace_all(&self, agent_id: &AgentId, new_list: Vec<ConversationRecord>) {
		let Some(handle) = self.handle_for(agent_id) else { return };
		let mut records = handle.records.lock().unwrap();
		*records = new_list;
		if let Some(persistence) = &self.persistence {
			persistence.snapshot_conversation(agent_id, &records);
		}
	}

	/// A copy of the current history, for request construction.
	pub fn snapshot(&self, agent_id: &AgentId) -> Vec<ConversationRecord> {
		self.handle_for(agent_id).map(|h| h.records.lock().unwrap().clone()).unwrap_or_default()
	}

	pub fn token_total(&self, agent_id: &AgentId) -> u32 {
		self.handle_for(agent_id)
			.map(|h| h.records.lock().unwrap().iter().map(|r| r.token_count).sum())
			.unwrap_or(0)
	}

	pub fn len(&self, agent_id: &AgentId) -> usize {
		self.handle_for(agent_id).map(|h| h.records.lock().unwrap().len()).unwrap_or(0)
	}

	/// Holds the per-agent mutex across a closure, so C5's "append during
	/// compression must not interleave" invariant is enforced structurally:
	/// C8 calls `maybe_compress` while holding this same lock via
	/// [`Self::with_lock`], never concurrently with its own `append`.
	pub fn with_lock<R>(
		&self,
		agent_id: &AgentId,
		f: impl FnOnce(MutexGuard<'_, Vec<ConversationRecord>>) -> R,
	) -> Option<R> {
		let handle = self.handle_for(agent_id)?;
		let guard = handle.records.lock().unwrap();
		Some(f(guard))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_estimate_tokens_ascii() {
		let n = estimate_tokens("hello world");
		assert!(n > 4, "overhead alone should not dominate: got {n}");
	}

	#[test]
	fn test_estimate_tokens_cjk_heavier_per_char() {
		let ascii = estimate_tokens("aaaaaaaaaa");
		let cjk = estimate_tokens("你好你好你好你好你好");
		assert!(cjk > ascii);
	}

	#[test]
	fn test_append_and_token_total() {
		let store = ConversationStore::new(None);
		let agent_id = AgentId::new();
		store.register(agent_id.clone(), ConversationRecord::system("sys"));
		store.append(&agent_id, ConversationRecord::user("hello"));
		assert_eq!(store.len(&agent_id), 2);
		assert!(store.token_total(&agent_id) > 0);
	}

	#[test]
	fn test_replace_all_used_by_compression() {
		let store = ConversationStore::new(None);
		let agent_id = AgentId::new();
		store.register(agent_id.clone(), ConversationRecord::system("sys"));
		for i in 0..20 {
			store.append(&agent_id, ConversationRecord::user(format!("msg {i}")));
		}
		let snapshot = store.snapshot(&agent_id);
		let new_list = vec![snapshot[0].clone(), ConversationRecord::compressed_summary("sum", 5)];
		store.replace_all(&agent_id, new_list);
		assert_eq!(store.len(&agent_id), 2);
		assert!(store.snapshot(&agent_id)[1].is_compressed);
	}
}
