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

//! The runtime facade (C10): composes C1–C9 into the one object an external
//! HTTP façade or in-process caller holds, per §4.10. Owns the `Querent` the
//! whole population of `TurnEngineActor`s is spawned under, so no other part
//! of this crate needs to keep it alive.

use std::sync::Arc;

use actors::Querent;
use agent_core::{
	AgentId, Bus, CancellationRegistry, ConversationStore, CoreError, CoreErrorKind, Envelope,
	ObserverPort, ReasoningService, TaskId, ToolRegistry,
};
use tracing::info;

use crate::{
	config::RuntimeConfig,
	lifecycle::{AbortReceipt, LifecycleManager, ShutdownReport, TerminationReceipt},
	observer::TracingObserver,
	persistence::{MessageLogObserver, NdjsonPersistence},
};

/// Queue depth plus live status for one agent, returned by `inspect_agent`.
#[derive(Clone, Debug)]
pub struct AgentInspection {
	pub agent: agent_core::Agent,
	pub queue_depth: usize,
}

/// `AgentRuntime` (C10): the object `agent-cli` and any future HTTP façade
/// hold. Construction wires C1–C9 together; `start`/`shutdown` own the
/// ordering from §4.10.
pub struct AgentRuntime {
	querent: Querent,
	bus: Bus,
	lifecycle: Arc<LifecycleManager>,
	config: Arc<RuntimeConfig>,
}

impl AgentRuntime {
	/// Wires the bus, conversation store, cancellation registry, and
	/// lifecycle manager together against a file-based persistence layer
	/// rooted at `config.runtime_dir`. Matches §4.10's "adapters → bus →
	/// registry" startup order: persistence and the reasoning-service
	/// adapter are constructed first, since the bus's observer and C9's
	/// restore both depend on them already existing.
	pub fn new(config: RuntimeConfig, reasoning: Arc<dyn ReasoningService>) -> anyhow::Result<Self> {
		let config = Arc::new(config);
		let persistence = Arc::new(NdjsonPersistence::new(&config.runtime_dir)?);

		let querent = Querent::new();
		let bus = Bus::new(actors::start_scheduler());
		bus.register_observer(Arc::new(TracingObserver));
		bus.register_observer(Arc::new(MessageLogObserver::new(persistence.clone())));

		let conversations = Arc::new(ConversationStore::new(Some(persistence.clone())));
		conversations.register(AgentId::root(), agent_core::ConversationRecord::system(""));
		conversations.register(AgentId::user(), agent_core::ConversationRecord::system(""));
		bus.register_recipient(AgentId::root());

		let cancellations = Arc::new(CancellationRegistry::new());

		let lifecycle = LifecycleManager::new(
			querent.spawn_ctx().clone(),
			bus.clone(),
			conversations,
			cancellations,
			reasoning,
			config.clone(),
			Some(persistence),
		);

		Ok(AgentRuntime { querent, bus, lifecycle, config })
	}

	/// Registers an additional envelope observer (e.g. a websocket fan-out
	/// the HTTP façade owns). Must be called before `start`, since the bus
	/// does not retroactively replay already-delivered envelopes.
	pub fn register_observer(&self, observer: Arc<dyn ObserverPort>) {
		self.bus.register_observer(observer);
	}

	/// Registers an externally implemented tool module; merged with the
	/// platform tools into the registry every subsequently spawned agent's
	/// turn engine receives.
	pub fn register_tool_module(&self, module: Arc<dyn ToolRegistry>) {
		self.lifecycle.register_tool_module(module);
	}

	/// Finishes startup: replays the persisted org graph so restarted agents
	/// resume processing, per §4.9's `restore`. Called once, after every
	/// observer/tool module the caller wants has been registered — "begin
	/// serving" in §4.10's ordering is simply returning from this call.
	pub async fn start(&self) -> anyhow::Result<()> {
		self.lifecycle.restore().await?;
		info!("agent runtime started");
		Ok(())
	}

	pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
		&self.lifecycle
	}

	// ---- Roles / spawn, thin delegations to C9 -----------------------------

	pub fn create_role(
		&self,
		name: impl Into<String>,
		prompt: impl Into<String>,
		capabilities: Vec<String>,
		created_by: Option<String>,
	) -> agent_core::Role {
		self.lifecycle.create_role(name, prompt, capabilities, created_by)
	}

	pub fn spawn(
		&self,
		role_id: &agent_core::RoleId,
		parent_agent_id: AgentId,
		custom_name: Option<String>,
	) -> Result<agent_core::Agent, CoreError> {
		self.lifecycle.spawn(role_id, parent_agent_id, custom_name)
	}

	/// `registerAgent(agent)` from §4.10: admits an already-materialized
	/// agent record (e.g. imported from another deployment) and starts its
	/// turn loop.
	pub fn register_agent(&self, agent: agent_core::Agent) -> Result<(), CoreError> {
		self.lifecycle.register_agent(agent)
	}

	// ---- Messaging ----------------------------------------------------------

	/// `submitToAgent(agentId, payload, {taskId?})` from §4.10: the single
	/// entry point an external caller (HTTP façade, CLI) uses to hand a user
	/// message to a live agent. Always addressed `from: AgentId::user()`.
	pub fn submit_to_agent(
		&self,
		agent_id: AgentId,
		text: impl Into<String>,
		task_id: Option<TaskId>,
	) -> Result<Envelope, CoreError> {
		if self.lifecycle.is_shutting_down() {
			return Err(CoreErrorKind::ShuttingDown.into());
		}
		self.lifecycle.send_message(AgentId::user(), agent_id, text, task_id)
	}

	// ---- Lifecycle operations, thin delegations to C9 -----------------------

	pub async fn abort_agent_llm_call(&self, agent_id: &AgentId) -> Result<AbortReceipt, CoreError> {
		self.lifecycle.abort_agent_llm_call(agent_id).await
	}

	pub async fn cascade_stop_agents(&self, root_of_subtree: &AgentId) -> Vec<AgentId> {
		self.lifecycle.cascade_stop_agents(root_of_subtree).await
	}

	pub async fn force_terminate_agent(&self, agent_id: &AgentId) -> Result<TerminationReceipt, CoreError> {
		self.lifecycle.force_terminate_agent(agent_id).await
	}

	// ---- Queue-depth / status inspection --------------------------------------

	pub fn inspect_agent(&self, agent_id: &AgentId) -> Option<AgentInspection> {
		let agent = self.lifecycle.get_agent(agent_id)?;
		let queue_depth = self.bus.queue_depth(agent_id);
		Some(AgentInspection { agent, queue_depth })
	}

	pub fn children_of(&self, agent_id: &AgentId) -> Vec<AgentId> {
		self.lifecycle.children_of(agent_id)
	}

	/// Coordinates a full system shutdown per §4.10's "stop accepting → drain
	/// → terminate → close adapters": C9's `shutdown` stops accepting new
	/// work and drains; this then quits every actor still registered with
	/// `Querent`, which is the "close adapters" step for the concurrency
	/// substrate (persistence and the reasoning-service adapter have no
	/// connections of their own to close).
	pub async fn shutdown(&self) -> ShutdownReport {
		let timeout = std::time::Duration::from_millis(self.config.shutdown_timeout_ms);
		let report = self.lifecycle.shutdown(timeout).await;
		self.querent.quit().await;
		report
	}
}

#[cfg(test)]
mod tests {
	use agent_core::{ports::NullPersistence, ChatOutcome, ChatRequest, ChatResponse, Usage};
	use async_trait::async_trait;

	use super::*;

	struct EchoReasoning;

	#[async_trait]
	impl ReasoningService for EchoReasoning {
		async fn chat(
			&self,
			_agent_id: &AgentId,
			request: ChatRequest,
			_token: agent_core::cancellation::CancellationToken,
		) -> ChatOutcome {
			let last = request.messages.last().map(|r| r.content.clone()).unwrap_or_default();
			ChatOutcome::Completed(ChatResponse {
				content: Some(format!("echo: {last}")),
				tool_calls: Vec::new(),
				usage: Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
				reasoning: None,
			})
		}

		async fn abort(&self, _agent_id: &AgentId) {}
	}

	fn test_runtime(dir: &std::path::Path) -> AgentRuntime {
		let mut config = RuntimeConfig::default();
		config.runtime_dir = dir.to_string_lossy().to_string();
		config.shutdown_timeout_ms = 200;
		let _ = NullPersistence;
		AgentRuntime::new(config, Arc::new(EchoReasoning)).unwrap()
	}

	#[tokio::test]
	async fn test_start_spawn_submit_and_shutdown_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let runtime = test_runtime(dir.path());
		runtime.start().await.unwrap();

		let role = runtime.create_role("worker", "sys prompt", vec![], None);
		let agent = runtime.spawn(&role.id, AgentId::root(), None).unwrap();
		assert!(runtime.inspect_agent(&agent.id).is_some());

		runtime.submit_to_agent(agent.id.clone(), "hello", None).unwrap();
		assert!(runtime.inspect_agent(&agent.id).unwrap().queue_depth <= 1);

		runtime.force_terminate_agent(&agent.id).await.unwrap();
		assert!(runtime.inspect_agent(&agent.id).is_none());

		let report = runtime.shutdown().await;
		assert!(report.ok);
	}

	#[tokio::test]
	async fn test_submit_rejected_once_shutting_down() {
		let dir = tempfile::tempdir().unwrap();
		let runtime = test_runtime(dir.path());
		runtime.start().await.unwrap();
		let role = runtime.create_role("worker", "sys", vec![], None);
		let agent = runtime.spawn(&role.id, AgentId::root(), None).unwrap();

		runtime.lifecycle().force_terminate_agent(&agent.id).await.unwrap();
		let report = runtime.shutdown().await;
		assert!(report.ok);

		let err = runtime.submit_to_agent(AgentId::root(), "late", None).unwrap_err();
		assert!(matches!(err.kind(), CoreErrorKind::ShuttingDown));
	}

	#[tokio::test]
	async fn test_register_agent_then_inspect() {
		let dir = tempfile::tempdir().unwrap();
		let runtime = test_runtime(dir.path());
		runtime.start().await.unwrap();
		let role = runtime.create_role("worker", "sys", vec![], None);
		let imported = agent_core::Agent::new(role.id.clone(), role.name.clone(), role.prompt.clone(), Some(AgentId::root()));
		let imported_id = imported.id.clone();
		runtime.register_agent(imported).unwrap();
		assert!(runtime.inspect_agent(&imported_id).is_some());
		runtime.force_terminate_agent(&imported_id).await.unwrap();
		runtime.shutdown().await;
	}

	/// §8 S6: shutdown with an agent parked mid-turn in `waiting_llm` still
	/// completes within the configured timeout via the cancellation fallback,
	/// since `HangingReasoning::chat` only returns once `abort` notifies it.
	struct HangingReasoning {
		notify: tokio::sync::Notify,
	}

	#[async_trait]
	impl ReasoningService for HangingReasoning {
		async fn chat(
			&self,
			_agent_id: &AgentId,
			_request: ChatRequest,
			_token: agent_core::cancellation::CancellationToken,
		) -> ChatOutcome {
			self.notify.notified().await;
			ChatOutcome::Cancelled
		}

		async fn abort(&self, _agent_id: &AgentId) {
			self.notify.notify_waiters();
		}
	}

	#[tokio::test]
	async fn test_shutdown_with_mid_turn_agent_completes_within_timeout() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = RuntimeConfig::default();
		config.runtime_dir = dir.path().to_string_lossy().to_string();
		config.shutdown_timeout_ms = 2000;
		let runtime = AgentRuntime::new(config, Arc::new(HangingReasoning { notify: tokio::sync::Notify::new() })).unwrap();
		runtime.start().await.unwrap();

		let role = runtime.create_role("worker", "sys prompt", vec![], None);
		let agent = runtime.spawn(&role.id, AgentId::root(), None).unwrap();
		runtime.submit_to_agent(agent.id.clone(), "hello", None).unwrap();

		// Give the turn loop a moment to pick the message up and enter `waiting_llm`.
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;

		let start = std::time::Instant::now();
		let report = runtime.shutdown().await;
		assert!(report.ok);
		assert_eq!(report.active_agents, 0);
		assert!(start.elapsed().as_millis() <= 2000);
	}
}
