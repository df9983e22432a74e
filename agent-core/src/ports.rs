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

//! External ports (§6): the seams the core exposes to collaborators that
//! live outside this crate. Implementations are file-based and live in
//! `agent-runtime`; the core only depends on the trait objects.

use crate::{conversation::ConversationRecord, envelope::Envelope, ids::AgentId};

/// Called after every `send`, best-effort: a failing observer never blocks
/// or fails the `send` call itself (§4.2).
pub trait ObserverPort: Send + Sync {
	fn on_envelope(&self, env: &Envelope);
}

/// Append/replace events from C4 flow here asynchronously; on restart the
/// lifecycle manager replays the persisted tail for each restored agent.
pub trait PersistencePort: Send + Sync {
	fn append_conversation_record(&self, agent_id: &AgentId, record: &ConversationRecord);
	fn snapshot_conversation(&self, agent_id: &AgentId, records: &[ConversationRecord]);
	fn append_log(&self, agent_id: &AgentId, env: &Envelope);
}

/// A no-op observer, useful as a default and in tests that do not care about
/// fan-out.
#[derive(Default)]
pub struct NullObserver;

impl ObserverPort for NullObserver {
	fn on_envelope(&self, _env: &Envelope) {}
}

/// A no-op persistence port, useful in tests that exercise C4/C5 without a
/// filesystem.
#[derive(Default)]
pub struct NullPersistence;

impl PersistencePort for NullPersistence {
	fn append_conversation_record(&self, _agent_id: &AgentId, _record: &ConversationRecord) {}
	fn snapshot_conversation(&self, _agent_id: &AgentId, _records: &[ConversationRecord]) {}
	fn append_log(&self, _agent_id: &AgentId, _env: &Envelope) {}
}
