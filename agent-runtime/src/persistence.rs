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

//! File-based implementation of `agent_core::PersistencePort` (§6): a
//! per-agent NDJSON message log plus a per-agent conversation snapshot file,
//! under `<runtimeDir>/messages/` and `<runtimeDir>/conversations/`.

use std::{
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
	sync::Mutex,
};

use agent_core::{Agent, AgentId, ConversationRecord, Envelope, ObserverPort, PersistencePort, Role};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The role graph persisted under `<runtimeDir>/org.json` (§6): every role
/// and agent record, so `LifecycleManager::restore` can reinstantiate the
/// whole population without replaying any in-flight message.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OrgGraph {
	pub roles: Vec<Role>,
	pub agents: Vec<Agent>,
}

pub struct NdjsonPersistence {
	messages_dir: PathBuf,
	conversations_dir: PathBuf,
	org_path: PathBuf,
	// One lock per process is coarse but simple: writes are small and rare
	// relative to turn processing, and this mirrors the append-only,
	// crash-only design §6 calls for ("no schema version field — additive
	// evolution is expected").
	write_lock: Mutex<()>,
}

impl NdjsonPersistence {
	pub fn new(runtime_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
		let runtime_dir = runtime_dir.as_ref();
		let messages_dir = runtime_dir.join("messages");
		let conversations_dir = runtime_dir.join("conversations");
		let org_path = runtime_dir.join("org.json");
		fs::create_dir_all(&messages_dir)?;
		fs::create_dir_all(&conversations_dir)?;
		Ok(NdjsonPersistence { messages_dir, conversations_dir, org_path, write_lock: Mutex::new(()) })
	}

	fn message_log_path(&self, agent_id: &AgentId) -> PathBuf {
		self.messages_dir.join(format!("{}.ndjson", agent_id.as_str()))
	}

	fn conversation_path(&self, agent_id: &AgentId) -> PathBuf {
		self.conversations_dir.join(format!("{}.json", agent_id.as_str()))
	}

	fn conversation_append_log_path(&self, agent_id: &AgentId) -> PathBuf {
		self.conversations_dir.join(format!("{}.ndjson", agent_id.as_str()))
	}

	/// Writes the full role/agent graph, used by C9 after every structural
	/// mutation (spawn, terminate) so a restart has a record to replay.
	pub fn save_org_graph(&self, graph: &OrgGraph) -> anyhow::Result<()> {
		let json = serde_json::to_string_pretty(graph)?;
		let _guard = self.write_lock.lock().unwrap();
		fs::write(&self.org_path, json)?;
		Ok(())
	}

	/// Reads the persisted role/agent graph, used by C9's `restore`. Returns
	/// `None` on first boot, when no graph has ever been written.
	pub fn load_org_graph(&self) -> anyhow::Result<Option<OrgGraph>> {
		if !self.org_path.exists() {
			return Ok(None);
		}
		let contents = fs::read_to_string(&self.org_path)?;
		Ok(Some(serde_json::from_str(&contents)?))
	}

	/// Replays the persisted tail for `agent_id`, used by C9's `restore`.
	pub fn load_conversation(&self, agent_id: &AgentId) -> anyhow::Result<Option<Vec<ConversationRecord>>> {
		let path = self.conversation_path(agent_id);
		if !path.exists() {
			return Ok(None);
		}
		let contents = fs::read_to_string(path)?;
		Ok(Some(serde_json::from_str(&contents)?))
	}

	fn append_line(path: &Path, line: &str, lock: &Mutex<()>) {
		let _guard = lock.lock().unwrap();
		let result = OpenOptions::new().create(true).append(true).open(path).and_then(|mut file: File| {
			file.write_all(line.as_bytes())?;
			file.write_all(b"\n")
		});
		if let Err(err) = result {
			warn!(path = %path.display(), error = %err, "failed to append persistence record");
		}
	}
}

impl PersistencePort for NdjsonPersistence {
	fn append_conversation_record(&self, agent_id: &AgentId, record: &ConversationRecord) {
		let path = self.conversation_append_log_path(agent_id);
		match serde_json::to_string(record) {
			Ok(line) => Self::append_line(&path, &line, &self.write_lock),
			Err(err) => warn!(%agent_id, error = %err, "failed to serialize conversation record"),
		}
	}

	fn snapshot_conversation(&self, agent_id: &AgentId, records: &[ConversationRecord]) {
		let path = self.conversation_path(agent_id);
		match serde_json::to_string_pretty(records) {
			Ok(json) => {
				let _guard = self.write_lock.lock().unwrap();
				if let Err(err) = fs::write(&path, json) {
					warn!(path = %path.display(), error = %err, "failed to write conversation snapshot");
				}
			},
			Err(err) => warn!(%agent_id, error = %err, "failed to serialize conversation snapshot"),
		}
	}

	fn append_log(&self, agent_id: &AgentId, env: &Envelope) {
		let path = self.message_log_path(agent_id);
		match serde_json::to_string(env) {
			Ok(line) => Self::append_line(&path, &line, &self.write_lock),
			Err(err) => warn!(%agent_id, error = %err, "failed to serialize envelope for message log"),
		}
	}
}

/// Bridges the bus's observer fan-out to [`PersistencePort::append_log`], so
/// the per-agent message log fills without C8 or C9 needing to know
/// persistence exists.
pub struct MessageLogObserver {
	persistence: std::sync::Arc<dyn PersistencePort>,
}

impl MessageLogObserver {
	pub fn new(persistence: std::sync::Arc<dyn PersistencePort>) -> Self {
		MessageLogObserver { persistence }
	}
}

impl ObserverPort for MessageLogObserver {
	fn on_envelope(&self, env: &Envelope) {
		self.persistence.append_log(&env.to, env);
	}
}

#[cfg(test)]
mod tests {
	use agent_core::{ConversationRecord, EnvelopeDraft, EnvelopeKind, Payload};

	use super::*;

	#[test]
	fn test_append_log_and_snapshot_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let persistence = NdjsonPersistence::new(dir.path()).unwrap();
		let agent_id = AgentId::new();

		let env = EnvelopeDraft::new(
			AgentId::user(),
			agent_id.clone(),
			EnvelopeKind::Text,
			Payload::text("hello"),
		);
		let env = agent_core::bus::Bus::new(actors::start_scheduler()).send(env).unwrap();
		persistence.append_log(&agent_id, &env);
		let log_path = persistence.message_log_path(&agent_id);
		let contents = fs::read_to_string(log_path).unwrap();
		assert!(contents.contains("hello"));

		let records = vec![ConversationRecord::system("sys"), ConversationRecord::user("hi")];
		persistence.snapshot_conversation(&agent_id, &records);
		let loaded = persistence.load_conversation(&agent_id).unwrap().unwrap();
		assert_eq!(loaded.len(), 2);
	}

	#[test]
	fn test_load_conversation_missing_returns_none() {
		let dir = tempfile::tempdir().unwrap();
		let persistence = NdjsonPersistence::new(dir.path()).unwrap();
		assert!(persistence.load_conversation(&AgentId::new()).unwrap().is_none());
	}

	#[test]
	fn test_org_graph_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let persistence = NdjsonPersistence::new(dir.path()).unwrap();
		assert!(persistence.load_org_graph().unwrap().is_none());

		let role = agent_core::Role::new("worker", "you are a worker");
		let agent = agent_core::Agent::new(role.id.clone(), role.name.clone(), role.prompt.clone(), Some(AgentId::root()));
		let graph = OrgGraph { roles: vec![role], agents: vec![agent] };
		persistence.save_org_graph(&graph).unwrap();

		let loaded = persistence.load_org_graph().unwrap().unwrap();
		assert_eq!(loaded.roles.len(), 1);
		assert_eq!(loaded.agents.len(), 1);
	}
}
