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

//! Per-agent cancellation epochs (C3): the single source of truth for
//! mid-turn cancellation. Deliberately not built from `actors`'
//! [`common::TerimateSignal`], which is a binary whole-actor kill switch —
//! this registry is resumable: raising an agent's epoch cancels every token
//! bound to the previous one without tearing the agent's loop down.

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex,
	},
};

use crate::ids::AgentId;

/// `{agentId, epoch}` from §3. Cheap to clone and queryable against the
/// registry it was minted from regardless of whether that agent is later
/// cleared: it holds its own `Arc` onto the epoch counter rather than
/// reaching back into the registry's map.
#[derive(Clone, Debug)]
pub struct CancellationToken {
	agent_id: AgentId,
	epoch: u64,
	current: Arc<AtomicU64>,
}

impl CancellationToken {
	pub fn agent_id(&self) -> &AgentId {
		&self.agent_id
	}

	/// The epoch this token is bound to.
	pub fn epoch(&self) -> u64 {
		self.epoch
	}

	/// True once the agent's current epoch has moved past the one this
	/// token was minted with.
	pub fn is_cancelled(&self) -> bool {
		self.current.load(Ordering::SeqCst) > self.epoch
	}
}

impl PartialEq for CancellationToken {
	fn eq(&self, other: &Self) -> bool {
		self.agent_id == other.agent_id && self.epoch == other.epoch
	}
}

struct Entry {
	epoch: Arc<AtomicU64>,
}

/// Associates each [`AgentId`] with a current epoch. Guarded by a plain
/// `Mutex`, consistent with §5's lock order — callers that also hold the
/// lifecycle mutex must acquire it before this one.
#[derive(Default)]
pub struct CancellationRegistry {
	entries: Mutex<HashMap<AgentId, Entry>>,
}

impl CancellationRegistry {
	pub fn new() -> Self {
		CancellationRegistry::default()
	}

	/// Registers a fresh agent at epoch 0. Idempotent: re-registering an
	/// already-known agent leaves its epoch untouched.
	pub fn register(&self, agent_id: &AgentId) {
		self.entries
			.lock()
			.unwrap()
			.entry(agent_id.clone())
			.or_insert_with(|| Entry { epoch: Arc::new(AtomicU64::new(0)) });
	}

	/// Mints a token bound to the agent's current epoch. Registers the agent
	/// first if it is not already known.
	pub fn token_for(&self, agent_id: &AgentId) -> CancellationToken {
		self.register(agent_id);
		let entries = self.entries.lock().unwrap();
		let entry = entries.get(agent_id).expect("just registered");
		CancellationToken {
			agent_id: agent_id.clone(),
			epoch: entry.epoch.load(Ordering::SeqCst),
			current: entry.epoch.clone(),
		}
	}

	/// Increments the agent's epoch, cancelling every token minted against
	/// the previous one. Used by `abortAgentLlmCall` and by cascade-stop /
	/// force-terminate.
	pub fn abort(&self, agent_id: &AgentId) -> u64 {
		self.register(agent_id);
		let entries = self.entries.lock().unwrap();
		let entry = entries.get(agent_id).expect("just registered");
		entry.epoch.fetch_add(1, Ordering::SeqCst) + 1
	}

	pub fn current_epoch(&self, agent_id: &AgentId) -> Option<u64> {
		self.entries.lock().unwrap().get(agent_id).map(|e| e.epoch.load(Ordering::SeqCst))
	}

	/// Removes the entry on agent termination.
	pub fn clear(&self, agent_id: &AgentId) {
		self.entries.lock().unwrap().remove(agent_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_token_not_cancelled_initially() {
		let registry = CancellationRegistry::new();
		let agent_id = AgentId::new();
		let token = registry.token_for(&agent_id);
		assert!(!token.is_cancelled());
	}

	#[test]
	fn test_abort_cancels_outstanding_tokens() {
		let registry = CancellationRegistry::new();
		let agent_id = AgentId::new();
		let token = registry.token_for(&agent_id);
		assert!(!token.is_cancelled());
		registry.abort(&agent_id);
		assert!(token.is_cancelled());
	}

	#[test]
	fn test_abort_strictly_increases_epoch() {
		let registry = CancellationRegistry::new();
		let agent_id = AgentId::new();
		let before = registry.token_for(&agent_id).epoch();
		registry.abort(&agent_id);
		let after = registry.token_for(&agent_id).epoch();
		assert!(after > before);
	}

	#[test]
	fn test_clear_resets_agent() {
		let registry = CancellationRegistry::new();
		let agent_id = AgentId::new();
		registry.abort(&agent_id);
		registry.clear(&agent_id);
		assert_eq!(registry.token_for(&agent_id).epoch(), 0);
	}
}
