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

//! The lifecycle manager (C9): agent table, parent/child graph, role table,
//! and the spawn / restore / abort / cascade-stop / force-terminate /
//! graceful-shutdown operations from §4.9, behind one `Mutex` per §5's lock
//! order ("lifecycle registry → per-agent state → inbox → conversation").
//!
//! Each spawned agent's `TurnEngineActor` is registered with the workspace's
//! own `actors::ActorRegistry` indirectly through its `ActorHandle`, held
//! here rather than re-discovered via `Querent::get_one` on every operation
//! — C9 already needs a keyed-by-`AgentId` table for the parent graph, so a
//! second lookup through the type-erased registry would just be slower.

use std::{
	collections::{HashMap, VecDeque},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex, Weak,
	},
	time::{Duration, Instant},
};

use actors::{ActorHandle, SpawnContext};
use agent_core::{
	Agent, AgentId, AgentStatus, Bus, CancellationRegistry, ComputeStatus, ConversationRecord,
	ConversationStore, CoreError, CoreErrorKind, Envelope, EnvelopeKind, Payload, ReasoningService,
	Role, RoleId, TaskId, ToolRegistry,
};
use tracing::{info, warn};

use crate::{
	config::RuntimeConfig,
	persistence::NdjsonPersistence,
	platform_tools::PlatformToolRegistry,
	turn_engine::{seed_conversation, spawn_inbox_pump, TurnEngineActor},
};

struct TurnHandle {
	actor: ActorHandle<TurnEngineActor>,
	pump: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
struct LifecycleState {
	agents: HashMap<AgentId, Agent>,
	children: HashMap<AgentId, Vec<AgentId>>,
	roles: HashMap<RoleId, Role>,
	handles: HashMap<AgentId, TurnHandle>,
}

/// `{ok, aborted}` from §4.9's `abortAgentLlmCall`.
#[derive(Clone, Debug)]
pub struct AbortReceipt {
	pub ok: bool,
	pub aborted: bool,
	pub epoch: u64,
}

/// Returned by `forceTerminateAgent`: every id removed from the tables,
/// deepest-first.
#[derive(Clone, Debug)]
pub struct TerminationReceipt {
	pub agent_id: AgentId,
	pub terminated: Vec<AgentId>,
}

/// `{ok, pendingMessages, activeAgents, shutdownDuration}` from §4.9's
/// graceful shutdown.
#[derive(Clone, Debug)]
pub struct ShutdownReport {
	pub ok: bool,
	pub pending_messages: usize,
	pub active_agents: usize,
	pub shutdown_duration_ms: u64,
}

pub struct LifecycleManager {
	spawn_ctx: SpawnContext,
	bus: Bus,
	conversations: Arc<ConversationStore>,
	cancellations: Arc<CancellationRegistry>,
	reasoning: Arc<dyn ReasoningService>,
	config: Arc<RuntimeConfig>,
	persistence: Option<Arc<NdjsonPersistence>>,
	modules: Mutex<Vec<Arc<dyn ToolRegistry>>>,
	state: Mutex<LifecycleState>,
	shutting_down: AtomicBool,
	self_weak: Weak<LifecycleManager>,
}

impl LifecycleManager {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		spawn_ctx: SpawnContext,
		bus: Bus,
		conversations: Arc<ConversationStore>,
		cancellations: Arc<CancellationRegistry>,
		reasoning: Arc<dyn ReasoningService>,
		config: Arc<RuntimeConfig>,
		persistence: Option<Arc<NdjsonPersistence>>,
	) -> Arc<Self> {
		Arc::new_cyclic(|self_weak| {
			let mut state = LifecycleState::default();
			state.agents.insert(AgentId::root(), Agent::sentinel_root());
			state.agents.insert(AgentId::user(), Agent::sentinel_user());
			LifecycleManager {
				spawn_ctx,
				bus,
				conversations,
				cancellations,
				reasoning,
				config,
				persistence,
				modules: Mutex::new(Vec::new()),
				state: Mutex::new(state),
				shutting_down: AtomicBool::new(false),
				self_weak: self_weak.clone(),
			}
		})
	}

	pub fn is_shutting_down(&self) -> bool {
		self.shutting_down.load(Ordering::SeqCst)
	}

	pub fn register_tool_module(&self, module: Arc<dyn ToolRegistry>) {
		self.modules.lock().unwrap().push(module);
	}

	fn build_tool_registry(&self) -> Arc<dyn ToolRegistry> {
		let modules = self.modules.lock().unwrap().clone();
		Arc::new(PlatformToolRegistry::new(self.self_weak.clone(), modules))
	}

	fn persist_org_graph(&self) {
		let Some(persistence) = &self.persistence else { return };
		let state = self.state.lock().unwrap();
		let graph = crate::persistence::OrgGraph {
			roles: state.roles.values().cloned().collect(),
			agents: state.agents.values().cloned().collect(),
		};
		drop(state);
		if let Err(err) = persistence.save_org_graph(&graph) {
			warn!(error = %err, "failed to persist role/agent graph");
		}
	}

	// ---- Roles -----------------------------------------------------------

	pub fn create_role(
		&self,
		name: impl Into<String>,
		prompt: impl Into<String>,
		capabilities: Vec<String>,
		created_by: Option<String>,
	) -> Role {
		let mut role = Role::new(name, prompt).with_capabilities(capabilities);
		role.created_by = created_by;
		self.state.lock().unwrap().roles.insert(role.id.clone(), role.clone());
		self.persist_org_graph();
		role
	}

	pub fn get_role(&self, role_id: &RoleId) -> Option<Role> {
		self.state.lock().unwrap().roles.get(role_id).cloned()
	}

	/// Soft-deletes a role: marks it inactive, leaving already-instantiated
	/// agents untouched (§3: "deletion is soft").
	pub fn deactivate_role(&self, role_id: &RoleId) -> Result<(), CoreError> {
		let mut state = self.state.lock().unwrap();
		let role = state.roles.get_mut(role_id).ok_or(CoreErrorKind::RoleNotFound)?;
		role.active = false;
		drop(state);
		self.persist_org_graph();
		Ok(())
	}

	fn model_for_role(&self, role: &Role) -> String {
		self.config
			.reasoning_services
			.iter()
			.find(|svc| svc.name == role.name || svc.id == role.name)
			.map(|svc| svc.model.clone())
			.unwrap_or_else(|| self.config.default_model.clone())
	}

	// ---- Spawn / restore ---------------------------------------------------

	/// `spawn(roleId, parentAgentId)` from §4.9.
	pub fn spawn(
		&self,
		role_id: &RoleId,
		parent_agent_id: AgentId,
		custom_name: Option<String>,
	) -> Result<Agent, CoreError> {
		if self.is_shutting_down() {
			return Err(CoreErrorKind::ShuttingDown.into());
		}
		if parent_agent_id.is_user() {
			return Err(CoreErrorKind::ParentNotFound.into());
		}
		let mut state = self.state.lock().unwrap();
		if !state.agents.contains_key(&parent_agent_id) {
			return Err(CoreErrorKind::ParentNotFound.into());
		}
		let role = state.roles.get(role_id).cloned().ok_or(CoreErrorKind::RoleNotFound)?;
		let model = self.model_for_role(&role);

		let mut agent = Agent::new(role.id.clone(), role.name.clone(), role.prompt.clone(), Some(parent_agent_id.clone()));
		agent.custom_name = custom_name;
		drop(state);

		seed_conversation(&self.conversations, &agent);
		let handle = self.start_turn_engine(&agent, model);

		let mut state = self.state.lock().unwrap();
		state.agents.insert(agent.id.clone(), agent.clone());
		state.children.entry(parent_agent_id).or_default().push(agent.id.clone());
		state.handles.insert(agent.id.clone(), handle);
		drop(state);

		info!(agent_id = %agent.id, role = %role.name, "agent spawned");
		self.persist_org_graph();
		Ok(agent)
	}

	/// Starts a `TurnEngineActor` for an already-materialized agent: used by
	/// `spawn`, `restore`, and `register_agent` alike so the three paths
	/// cannot drift out of sync on how a turn loop gets wired up.
	fn start_turn_engine(&self, agent: &Agent, model: String) -> TurnHandle {
		self.cancellations.register(&agent.id);
		self.bus.register_recipient(agent.id.clone());
		let tools = self.build_tool_registry();
		let actor = TurnEngineActor::new(
			agent.id.clone(),
			self.bus.clone(),
			self.conversations.clone(),
			self.cancellations.clone(),
			self.reasoning.clone(),
			tools,
			self.config.clone(),
			model,
		);
		let (messagebus, actor_handle) = self.spawn_ctx.spawn_builder::<TurnEngineActor>().spawn(actor);
		let pump = tokio::spawn(spawn_inbox_pump(self.bus.clone(), agent.id.clone(), self.cancellations.clone(), messagebus));
		TurnHandle { actor: actor_handle, pump }
	}

	fn model_for_agent(&self, agent: &Agent) -> String {
		self.state
			.lock()
			.unwrap()
			.roles
			.get(&agent.role_id)
			.map(|role| self.model_for_role(role))
			.unwrap_or_else(|| self.config.default_model.clone())
	}

	/// Registers an already-constructed [`Agent`] (e.g. imported from another
	/// system) and starts its turn loop, per C10's `registerAgent`. The
	/// caller is responsible for the parent already existing.
	pub fn register_agent(&self, agent: Agent) -> Result<(), CoreError> {
		if self.is_shutting_down() {
			return Err(CoreErrorKind::ShuttingDown.into());
		}
		{
			let state = self.state.lock().unwrap();
			if let Some(parent) = &agent.parent_agent_id {
				if !state.agents.contains_key(parent) {
					return Err(CoreErrorKind::ParentNotFound.into());
				}
			}
		}
		let model = self.model_for_agent(&agent);
		seed_conversation(&self.conversations, &agent);
		let handle = self.start_turn_engine(&agent, model);

		let mut state = self.state.lock().unwrap();
		if let Some(parent) = agent.parent_agent_id.clone() {
			state.children.entry(parent).or_default().push(agent.id.clone());
		}
		state.agents.insert(agent.id.clone(), agent.clone());
		state.handles.insert(agent.id.clone(), handle);
		drop(state);

		info!(agent_id = %agent.id, "agent registered");
		self.persist_org_graph();
		Ok(())
	}

	/// Reinstantiates the persisted population on startup, per §4.9
	/// `restore`: "without replaying any in-flight messages (those are
	/// considered lost by design)".
	pub async fn restore(&self) -> anyhow::Result<()> {
		let Some(persistence) = self.persistence.clone() else { return Ok(()) };
		let Some(graph) = persistence.load_org_graph()? else { return Ok(()) };

		{
			let mut state = self.state.lock().unwrap();
			for role in graph.roles {
				state.roles.insert(role.id.clone(), role);
			}
		}

		for agent in graph.agents {
			if agent.id.is_sentinel() {
				continue;
			}
			{
				let mut state = self.state.lock().unwrap();
				state.agents.insert(agent.id.clone(), agent.clone());
				if let Some(parent) = agent.parent_agent_id.clone() {
					state.children.entry(parent).or_default().push(agent.id.clone());
				}
			}
			if agent.status != AgentStatus::Active {
				continue;
			}

			let records = persistence
				.load_conversation(&agent.id)?
				.unwrap_or_else(|| vec![ConversationRecord::system(agent.effective_system_prompt())]);
			self.conversations.restore(agent.id.clone(), records);

			let model = self.model_for_agent(&agent);
			let handle = self.start_turn_engine(&agent, model);
			self.state.lock().unwrap().handles.insert(agent.id.clone(), handle);
			info!(agent_id = %agent.id, "agent restored");
		}
		Ok(())
	}

	// ---- Queries ------------------------------------------------------------

	/// Reads the agent record, overlaying the turn engine's live
	/// `computeStatus` (the actor is the sole writer of that field during
	/// normal processing; this table's copy is only authoritative for
	/// lifecycle-driven transitions like cascade-stop).
	pub fn get_agent(&self, agent_id: &AgentId) -> Option<Agent> {
		let state = self.state.lock().unwrap();
		let mut agent = state.agents.get(agent_id)?.clone();
		if let Some(handle) = state.handles.get(agent_id) {
			agent.compute_status = handle.actor.last_observation().compute_status;
		}
		Some(agent)
	}

	pub fn children_of(&self, agent_id: &AgentId) -> Vec<AgentId> {
		self.state.lock().unwrap().children.get(agent_id).cloned().unwrap_or_default()
	}

	fn descendant_ids(&self, root: &AgentId) -> Vec<AgentId> {
		let state = self.state.lock().unwrap();
		let mut result = Vec::new();
		let mut queue: VecDeque<AgentId> = state.children.get(root).cloned().unwrap_or_default().into();
		while let Some(id) = queue.pop_front() {
			if let Some(kids) = state.children.get(&id) {
				queue.extend(kids.iter().cloned());
			}
			result.push(id);
		}
		result
	}

	// ---- Prompt appendix (used by the `get/set_system_prompt_appendix`
	// platform tools) -------------------------------------------------------

	pub fn get_system_prompt_appendix(&self, agent_id: &AgentId) -> Result<Option<String>, CoreError> {
		let state = self.state.lock().unwrap();
		let agent = state.agents.get(agent_id).ok_or(CoreErrorKind::AgentNotFound)?;
		Ok(agent.system_prompt_appendix.clone())
	}

	pub fn set_system_prompt_appendix(&self, agent_id: &AgentId, appendix: Option<String>) -> Result<(), CoreError> {
		let mut state = self.state.lock().unwrap();
		let agent = state.agents.get_mut(agent_id).ok_or(CoreErrorKind::AgentNotFound)?;
		agent.system_prompt_appendix = appendix;
		Ok(())
	}

	// ---- Messaging helper used by the `send_message_to_agent` platform tool

	pub fn send_message(
		&self,
		from: AgentId,
		to: AgentId,
		text: impl Into<String>,
		task_id: Option<TaskId>,
	) -> Result<Envelope, CoreError> {
		let mut draft = agent_core::EnvelopeDraft::new(from, to, EnvelopeKind::Text, Payload::text(text));
		if let Some(task_id) = task_id {
			draft = draft.with_task(task_id);
		}
		self.bus.send(draft)
	}

	// ---- Cancellation / cascade-stop / termination -------------------------

	/// `abortAgentLlmCall(agentId)` from §4.9: lets the agent "answer again"
	/// without losing its conversation. Leaves the inbox intact.
	pub async fn abort_agent_llm_call(&self, agent_id: &AgentId) -> Result<AbortReceipt, CoreError> {
		if !self.state.lock().unwrap().agents.contains_key(agent_id) {
			return Err(CoreErrorKind::AgentNotFound.into());
		}
		let epoch = self.cancellations.abort(agent_id);
		self.reasoning.abort(agent_id).await;
		Ok(AbortReceipt { ok: true, aborted: true, epoch })
	}

	/// `cascadeStopAgents(rootOfSubtree)` from §4.9. Stops every active
	/// descendant; `rootOfSubtree` itself is left running (§8 S3).
	pub async fn cascade_stop_agents(&self, root_of_subtree: &AgentId) -> Vec<AgentId> {
		let descendants = self.descendant_ids(root_of_subtree);
		let mut stopped = Vec::new();
		for agent_id in &descendants {
			let should_stop = {
				let mut state = self.state.lock().unwrap();
				match state.agents.get_mut(agent_id) {
					Some(agent) if agent.status == AgentStatus::Active => {
						agent.compute_status = ComputeStatus::Stopping;
						true
					},
					_ => false,
				}
			};
			if !should_stop {
				continue;
			}
			self.cancellations.abort(agent_id);
			self.reasoning.abort(agent_id).await;
			self.bus.clear_queue(agent_id);
			let mut state = self.state.lock().unwrap();
			if let Some(agent) = state.agents.get_mut(agent_id) {
				agent.compute_status = ComputeStatus::Stopped;
			}
			drop(state);
			stopped.push(agent_id.clone());
		}
		info!(root = %root_of_subtree, stopped = stopped.len(), "cascade-stop completed");
		stopped
	}

	async fn teardown_agent(&self, agent_id: &AgentId) {
		let handle = {
			let mut state = self.state.lock().unwrap();
			let parent = state.agents.get(agent_id).and_then(|a| a.parent_agent_id.clone());
			state.agents.remove(agent_id);
			state.children.remove(agent_id);
			if let Some(parent_id) = parent {
				if let Some(kids) = state.children.get_mut(&parent_id) {
					kids.retain(|k| k != agent_id);
				}
			}
			state.handles.remove(agent_id)
		};
		self.conversations.remove(agent_id);
		self.bus.unregister_recipient(agent_id);
		self.cancellations.clear(agent_id);
		if let Some(handle) = handle {
			handle.pump.abort();
			let _ = handle.actor.kill().await;
		}
	}

	/// `forceTerminateAgent(agentId, options)` from §4.9. Refuses `root` and
	/// `user`; cascade-stops the whole subtree first, then deletes deepest
	/// first.
	pub async fn force_terminate_agent(&self, agent_id: &AgentId) -> Result<TerminationReceipt, CoreError> {
		if agent_id.is_sentinel() {
			return Err(CoreErrorKind::SentinelAgent.into());
		}
		if !self.state.lock().unwrap().agents.contains_key(agent_id) {
			return Err(CoreErrorKind::AgentNotFound.into());
		}

		let mut subtree = self.descendant_ids(agent_id);
		subtree.push(agent_id.clone());

		for id in &subtree {
			self.cancellations.abort(id);
			self.reasoning.abort(id).await;
			self.bus.clear_queue(id);
		}
		for id in subtree.iter().rev() {
			self.teardown_agent(id).await;
		}

		info!(agent_id = %agent_id, count = subtree.len(), "agent subtree terminated");
		self.persist_org_graph();
		Ok(TerminationReceipt { agent_id: agent_id.clone(), terminated: subtree })
	}

	// ---- Graceful shutdown --------------------------------------------------

	fn snapshot_pending_and_active(&self) -> (usize, Vec<AgentId>) {
		let state = self.state.lock().unwrap();
		let mut pending = 0;
		let mut active = Vec::new();
		for (id, handle) in state.handles.iter() {
			pending += self.bus.queue_depth(id);
			let status = handle.actor.last_observation().compute_status;
			if !matches!(status, ComputeStatus::Idle) {
				active.push(id.clone());
			}
		}
		(pending, active)
	}

	/// Coordinates system-wide graceful shutdown per §4.9: rejects new
	/// `spawn`/submissions, drains up to `timeout`, then raises cancellation
	/// on every agent and waits briefly for loops to settle.
	pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
		self.shutting_down.store(true, Ordering::SeqCst);
		let start = Instant::now();
		let poll_interval = Duration::from_millis(50);
		loop {
			let (pending, active) = self.snapshot_pending_and_active();
			if pending == 0 && active.is_empty() {
				break;
			}
			let elapsed = start.elapsed();
			if elapsed >= timeout {
				break;
			}
			tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
		}

		let agent_ids: Vec<AgentId> = {
			let state = self.state.lock().unwrap();
			state.agents.keys().filter(|id| !id.is_sentinel()).cloned().collect()
		};
		for id in &agent_ids {
			self.cancellations.abort(id);
			self.reasoning.abort(id).await;
		}
		tokio::time::sleep(Duration::from_millis(20)).await;

		let (pending, active) = self.snapshot_pending_and_active();
		let report = ShutdownReport {
			ok: pending == 0 && active.is_empty(),
			pending_messages: pending,
			active_agents: active.len(),
			shutdown_duration_ms: start.elapsed().as_millis() as u64,
		};
		info!(?report.ok, pending = report.pending_messages, active = report.active_agents, "shutdown complete");
		report
	}
}

#[cfg(test)]
mod tests {
	use agent_core::{ports::NullPersistence, tools::EmptyToolRegistry, ChatOutcome, ChatRequest, ChatResponse, Usage};
	use async_trait::async_trait;
	use agent_core::cancellation::CancellationToken;

	use super::*;

	struct EchoReasoning;

	#[async_trait]
	impl ReasoningService for EchoReasoning {
		async fn chat(&self, _agent_id: &AgentId, request: ChatRequest, _token: CancellationToken) -> ChatOutcome {
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

	fn test_manager() -> (actors::Querent, Bus, Arc<LifecycleManager>) {
		let querent = actors::Querent::with_accelerated_time();
		let bus = Bus::new(actors::start_scheduler());
		bus.register_recipient(AgentId::root());
		let conversations = Arc::new(ConversationStore::new(None));
		conversations.register(AgentId::root(), ConversationRecord::system(""));
		conversations.register(AgentId::user(), ConversationRecord::system(""));
		let cancellations = Arc::new(CancellationRegistry::new());
		let config = Arc::new(RuntimeConfig::default());
		let manager = LifecycleManager::new(
			querent.spawn_ctx().clone(),
			bus.clone(),
			conversations,
			cancellations,
			Arc::new(EchoReasoning),
			config,
			None,
		);
		let _ = EmptyToolRegistry;
		let _ = NullPersistence;
		(querent, bus, manager)
	}

	#[tokio::test]
	async fn test_spawn_registers_agent_and_children() {
		let (querent, _bus, manager) = test_manager();
		let role = manager.create_role("worker", "sys prompt", vec![], None);
		let agent = manager.spawn(&role.id, AgentId::root(), None).unwrap();
		assert_eq!(manager.children_of(&AgentId::root()), vec![agent.id.clone()]);
		assert!(manager.get_agent(&agent.id).is_some());
		manager.force_terminate_agent(&agent.id).await.unwrap();
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_spawn_rejects_unknown_parent() {
		let (querent, _bus, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let err = manager.spawn(&role.id, AgentId::new(), None).unwrap_err();
		assert!(matches!(err.kind(), CoreErrorKind::ParentNotFound));
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_spawn_rejects_user_as_parent() {
		let (querent, _bus, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let err = manager.spawn(&role.id, AgentId::user(), None).unwrap_err();
		assert!(matches!(err.kind(), CoreErrorKind::ParentNotFound));
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_force_terminate_refuses_sentinels() {
		let (querent, _bus, manager) = test_manager();
		assert!(matches!(
			manager.force_terminate_agent(&AgentId::root()).await.unwrap_err().kind(),
			CoreErrorKind::SentinelAgent
		));
		assert!(matches!(
			manager.force_terminate_agent(&AgentId::user()).await.unwrap_err().kind(),
			CoreErrorKind::SentinelAgent
		));
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_spawn_then_terminate_round_trips_cardinality() {
		let (querent, _bus, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let before = manager.children_of(&AgentId::root()).len();
		let agent = manager.spawn(&role.id, AgentId::root(), None).unwrap();
		assert_eq!(manager.children_of(&AgentId::root()).len(), before + 1);
		manager.force_terminate_agent(&agent.id).await.unwrap();
		assert_eq!(manager.children_of(&AgentId::root()).len(), before);
		assert!(manager.get_agent(&agent.id).is_none());
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_cascade_stop_leaves_parent_running() {
		let (querent, _bus, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let parent = manager.spawn(&role.id, AgentId::root(), None).unwrap();
		let child = manager.spawn(&role.id, parent.id.clone(), None).unwrap();
		let stopped = manager.cascade_stop_agents(&parent.id).await;
		assert_eq!(stopped, vec![child.id.clone()]);
		assert_eq!(manager.get_agent(&parent.id).unwrap().status, AgentStatus::Active);
		assert_eq!(manager.get_agent(&child.id).unwrap().compute_status, ComputeStatus::Stopped);
		manager.force_terminate_agent(&parent.id).await.unwrap();
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_register_agent_starts_turn_loop_and_links_parent() {
		let (querent, _bus, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let imported = Agent::new(role.id.clone(), role.name.clone(), role.prompt.clone(), Some(AgentId::root()));
		let imported_id = imported.id.clone();
		manager.register_agent(imported).unwrap();
		assert!(manager.children_of(&AgentId::root()).contains(&imported_id));
		assert!(manager.get_agent(&imported_id).is_some());
		manager.force_terminate_agent(&imported_id).await.unwrap();
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_register_agent_rejects_unknown_parent() {
		let (querent, _bus, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let imported = Agent::new(role.id.clone(), role.name.clone(), role.prompt.clone(), Some(AgentId::new()));
		let err = manager.register_agent(imported).unwrap_err();
		assert!(matches!(err.kind(), CoreErrorKind::ParentNotFound));
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_abort_llm_call_strictly_increases_epoch() {
		let (querent, _bus, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let agent = manager.spawn(&role.id, AgentId::root(), None).unwrap();
		let receipt = manager.abort_agent_llm_call(&agent.id).await.unwrap();
		assert!(receipt.aborted);
		assert!(receipt.epoch > 0);
		manager.force_terminate_agent(&agent.id).await.unwrap();
		querent.quit().await;
	}
}
