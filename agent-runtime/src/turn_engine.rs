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

//! The turn engine (C8): one `TurnEngineActor` per live agent, driving the
//! per-agent loop from the spec's §4.8 verbatim.
//!
//! `agent_core::Bus` (C2) keeps its own `channel_with_priority` pair per
//! recipient rather than routing through each actor's built-in mailbox, so
//! that `clearQueue`/`queueDepth` stay simple third-party-readable
//! operations (see `agent_core::bus`'s module doc for the full reasoning).
//! That leaves a gap: with nothing ever touching `TurnEngineActor`'s own
//! mailbox, `process_messages()` would never run, and the framework's
//! `Command::Quit`/`Observe` handling (both delivered through that mailbox)
//! would never be serviced. [`spawn_inbox_pump`] bridges the two: a small
//! task that calls `Bus::await_next` in a loop and forwards each delivered
//! envelope into the actor's real mailbox via `MessageBus::send_message`,
//! where `Handler<Envelope>::handle` below picks it up. This keeps envelope
//! delivery on C2's dedicated channel while keeping the actor's lifecycle
//! (`quit`, `kill`, `observe`) on the framework's ordinary rails.

use std::sync::{
	atomic::{AtomicU32, Ordering},
	Arc,
};

use actors::{Actor, ActorContext, ActorExitStatus, Handler, MessageBus, QueueCapacity};
use agent_core::{
	bus::AwaitOutcome, cancellation::CancellationToken, conversation::ConversationRecord,
	envelope::{Envelope, EnvelopeDraft, EnvelopeKind, Payload, Priority},
	error::{CoreError, CoreErrorKind, ErrorPayload},
	estimate_tokens,
	ids::{AgentId, TaskId},
	reasoning::{ChatOutcome, ChatRequest, ChatResponse, ReasoningError, ReasoningErrorKind, ReasoningService, ToolChoice},
	tools::{ToolExecutionContext, ToolRegistry},
	Agent, AgentStatus, Bus, CancellationRegistry, ComputeStatus, ConversationStore,
};
use async_trait::async_trait;
use common::retry::{retry, RetryParams, Retryable};
use tracing::{info, warn};

use crate::config::RuntimeConfig;

/// Bounds a single chat attempt sequence: how it failed, for classification
/// by [`common::retry::retry`].
#[derive(Debug)]
enum ChatAttemptError {
	Cancelled,
	Failed(ReasoningError),
}

impl Retryable for ChatAttemptError {
	fn is_retryable(&self) -> bool {
		matches!(
			self,
			ChatAttemptError::Failed(err)
				if matches!(err.kind, ReasoningErrorKind::Network | ReasoningErrorKind::RateLimited)
		)
	}
}

/// Snapshot broadcast via `ActorHandle::observe` (§4.8: "external reads go
/// through `ActorHandle::observe`").
#[derive(Clone, Debug)]
pub struct TurnEngineState {
	pub agent_id: AgentId,
	pub compute_status: ComputeStatus,
	pub turns_processed: u64,
}

/// One per live agent. Holds no conversation state of its own — `C4`/`C5`
/// are shared, mutex-guarded stores reached through `Arc`s — so a restart
/// that respawns this actor against the same `AgentId` resumes exactly
/// where persistence left off.
pub struct TurnEngineActor {
	agent_id: AgentId,
	bus: Bus,
	conversations: Arc<ConversationStore>,
	cancellations: Arc<CancellationRegistry>,
	reasoning: Arc<dyn ReasoningService>,
	tools: Arc<dyn ToolRegistry>,
	config: Arc<RuntimeConfig>,
	model: String,
	compute_status: ComputeStatus,
	turns_processed: u64,
}

impl TurnEngineActor {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		agent_id: AgentId,
		bus: Bus,
		conversations: Arc<ConversationStore>,
		cancellations: Arc<CancellationRegistry>,
		reasoning: Arc<dyn ReasoningService>,
		tools: Arc<dyn ToolRegistry>,
		config: Arc<RuntimeConfig>,
		model: String,
	) -> Self {
		TurnEngineActor {
			agent_id,
			bus,
			conversations,
			cancellations,
			reasoning,
			tools,
			config,
			model,
			compute_status: ComputeStatus::Idle,
			turns_processed: 0,
		}
	}

	/// The reasoning service's own token count stands when it reports one; a
	/// `total_tokens` of zero means it didn't, so the heuristic estimate fills
	/// in rather than being recomputed later and destabilizing compression.
	fn token_count(usage_total: u32, text: &str) -> u32 {
		if usage_total > 0 {
			usage_total
		} else {
			estimate_tokens(text)
		}
	}

	fn reply_to(&self, to: AgentId, task_id: Option<TaskId>, kind: EnvelopeKind, payload: Payload) {
		let draft = EnvelopeDraft::new(self.agent_id.clone(), to.clone(), kind, payload);
		let draft = match task_id {
			Some(task_id) => draft.with_task(task_id),
			None => draft,
		};
		if let Err(err) = self.bus.send(draft.clone()) {
			if to.is_user() {
				warn!(agent_id = %self.agent_id, error = %err, "failed to deliver reply to user sink, dropping");
				return;
			}
			warn!(agent_id = %self.agent_id, to = %to, error = %err, "originator gone, routing reply to user sink instead");
			let rerouted = EnvelopeDraft::new(self.agent_id.clone(), AgentId::user(), draft.kind, draft.payload);
			let rerouted = match draft.task_id {
				Some(task_id) => rerouted.with_task(task_id),
				None => rerouted,
			};
			if let Err(err) = self.bus.send(rerouted) {
				warn!(agent_id = %self.agent_id, error = %err, "failed to deliver rerouted reply to user sink, dropping");
			}
		}
	}

	fn emit_reply_text(&self, to: AgentId, task_id: Option<TaskId>, text: impl Into<String>) {
		self.reply_to(to, task_id, EnvelopeKind::Text, Payload::text(text));
	}

	fn emit_abort(&self, to: AgentId, task_id: Option<TaskId>, message: impl Into<String>) {
		self.reply_to(to, task_id, EnvelopeKind::Abort, Payload::abort(message));
	}

	fn emit_error(&self, to: AgentId, task_id: Option<TaskId>, kind: CoreErrorKind) {
		let err = CoreError::new(kind).with_agent(self.agent_id.clone());
		let payload = ErrorPayload::from(&err);
		self.reply_to(to, task_id, EnvelopeKind::Error, Payload::Error(payload));
	}

	fn emit_tool_observation(
		&self,
		to: AgentId,
		task_id: Option<TaskId>,
		tool_name: String,
		args: serde_json::Value,
		result: serde_json::Value,
	) {
		self.reply_to(
			to,
			task_id,
			EnvelopeKind::ToolCall,
			Payload::ToolCall { tool_name, args, result, usage: None },
		);
	}

	fn build_request(&self, messages: Vec<ConversationRecord>) -> ChatRequest {
		let tools = self.tools.list_tools();
		let tool_choices: Vec<ToolChoice> = tools
			.into_iter()
			.map(|def| ToolChoice { name: def.name, description: def.description, parameters: def.parameters })
			.collect();
		ChatRequest {
			model: self.model.clone(),
			messages,
			tools: if tool_choices.is_empty() { None } else { Some(tool_choices) },
			temperature: None,
			max_tokens: None,
		}
	}

	/// Runs §4.5 step 5's stricter-budget retry on `context_limit_exceeded`:
	/// one additional compression pass with a forced-low threshold, then one
	/// more chat attempt. Returns `None` if compression made no difference
	/// (nothing left to compress).
	async fn retry_with_stricter_compression(&self, token: &CancellationToken) -> Option<Vec<ConversationRecord>> {
		let records = self.conversations.snapshot(&self.agent_id);
		let mut stricter = self.config.auto_compression.clone();
		stricter.threshold = 0.0;
		stricter.keep_recent_count = stricter.keep_recent_count.min(4);
		agent_core::compression::maybe_compress(&self.agent_id, &records, &stricter, self.reasoning.as_ref(), token.clone())
			.await
	}

	async fn attempt_chat(&self, request: ChatRequest, token: &CancellationToken) -> Result<(ChatResponse, u32), ChatAttemptError> {
		let attempts = Arc::new(AtomicU32::new(0));
		let retry_params = RetryParams::default();
		let result = retry(&retry_params, || {
			let attempts = attempts.clone();
			let request = request.clone();
			let token = token.clone();
			async move {
				attempts.fetch_add(1, Ordering::SeqCst);
				match self.reasoning.chat(&self.agent_id, request, token).await {
					ChatOutcome::Completed(resp) => Ok(resp),
					ChatOutcome::Cancelled => Err(ChatAttemptError::Cancelled),
					ChatOutcome::Failed(err) => Err(ChatAttemptError::Failed(err)),
				}
			}
		})
		.await;
		result.map(|resp| (resp, attempts.load(Ordering::SeqCst)))
	}

	/// Runs the entire `while true` body from §4.8 for one inbound envelope.
	async fn run_turn(&mut self, env: Envelope) {
		self.turns_processed += 1;
		if self.turns_processed > self.config.max_steps as u64 {
			self.emit_error(env.from.clone(), env.task_id.clone(), CoreErrorKind::AgentMessageProcessingFailed);
			return;
		}
		let token = self.cancellations.token_for(&self.agent_id);
		let from = env.from.clone();
		let task_id = env.task_id.clone();
		let user_text = env.payload.as_text().unwrap_or_default().to_string();
		self.conversations.append(&self.agent_id, ConversationRecord::user(user_text));

		self.compute_status = ComputeStatus::Processing;
		let mut rounds: u32 = 0;
		loop {
			let compressed = self.conversations.with_lock(&self.agent_id, |records| {
				let snapshot: Vec<ConversationRecord> = records.clone();
				snapshot
			});
			if let Some(records) = compressed {
				if let Some(new_list) =
					agent_core::compression::maybe_compress(&self.agent_id, &records, &self.config.auto_compression, self.reasoning.as_ref(), token.clone()).await
				{
					self.conversations.replace_all(&self.agent_id, new_list);
				}
			}

			if token.is_cancelled() {
				self.emit_abort(from.clone(), task_id.clone(), "turn cancelled");
				break;
			}

			self.compute_status = ComputeStatus::WaitingLlm;
			let request = self.build_request(self.conversations.snapshot(&self.agent_id));
			let outcome = self.attempt_chat(request, &token).await;
			self.compute_status = ComputeStatus::Processing;

			let (response, attempts) = match outcome {
				Ok(pair) => pair,
				Err(ChatAttemptError::Cancelled) => {
					self.emit_abort(from.clone(), task_id.clone(), "llm call cancelled");
					break;
				},
				Err(ChatAttemptError::Failed(err)) if err.kind == ReasoningErrorKind::ContextLimitExceeded => {
					if self.retry_with_stricter_compression(&token).await.is_some() {
						continue;
					}
					self.emit_error(from.clone(), task_id.clone(), CoreErrorKind::ContextLimitExceeded);
					break;
				},
				Err(ChatAttemptError::Failed(_)) => {
					self.emit_error(from.clone(), task_id.clone(), CoreErrorKind::LlmCallFailed { attempts });
					break;
				},
			};

			if !response.has_tool_calls() {
				let content = response.content.clone().unwrap_or_default();
				let token_count = Self::token_count(response.usage.total_tokens, &content);
				self
					.conversations
					.append(&self.agent_id, ConversationRecord::assistant_text(content.clone(), token_count));
				self.emit_reply_text(from.clone(), task_id.clone(), content);
				break;
			}

			let tool_calls_text: String = response.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
			let token_count = Self::token_count(response.usage.total_tokens, &tool_calls_text);
			self
				.conversations
				.append(&self.agent_id, ConversationRecord::assistant_tool_calls(response.tool_calls.clone(), token_count));

			let mut cancelled_mid_round = false;
			for tc in &response.tool_calls {
				if token.is_cancelled() {
					cancelled_mid_round = true;
					break;
				}
				let ctx = ToolExecutionContext {
					agent_id: self.agent_id.clone(),
					task_id: task_id.clone(),
					message_id: env.id.clone(),
					cancellation_token: token.clone(),
				};
				let result = match self.tools.execute(&tc.name, tc.args.clone(), &ctx).await {
					Ok(value) => value,
					Err(err) => {
						warn!(agent_id = %self.agent_id, tool = %tc.name, error = %err, "tool execution failed");
						serde_json::json!({ "error": err.message })
					},
				};
				self
					.conversations
					.append(&self.agent_id, ConversationRecord::tool_result(tc.id.clone(), result.to_string()));
				self.emit_tool_observation(from.clone(), task_id.clone(), tc.name.clone(), tc.args.clone(), result);
			}
			if cancelled_mid_round {
				self.emit_abort(from.clone(), task_id.clone(), "turn cancelled mid tool round");
				break;
			}

			rounds += 1;
			if rounds > self.config.max_tool_rounds {
				self.emit_error(from.clone(), task_id.clone(), CoreErrorKind::MaxToolRoundsExceeded);
				break;
			}
		}
		self.compute_status = ComputeStatus::Idle;
	}
}

#[async_trait]
impl Actor for TurnEngineActor {
	type ObservableState = TurnEngineState;

	fn name(&self) -> String {
		format!("turn-engine-{}", self.agent_id)
	}

	fn observable_state(&self) -> TurnEngineState {
		TurnEngineState {
			agent_id: self.agent_id.clone(),
			compute_status: self.compute_status,
			turns_processed: self.turns_processed,
		}
	}

	fn queue_capacity(&self) -> QueueCapacity {
		QueueCapacity::Unbounded
	}
}

#[async_trait]
impl Handler<Envelope> for TurnEngineActor {
	type Reply = ();

	async fn handle(&mut self, env: Envelope, _ctx: &ActorContext<Self>) -> Result<(), ActorExitStatus> {
		self.run_turn(env).await;
		Ok(())
	}
}

/// Feeds envelopes from `bus` into `messagebus` (the actor's real mailbox),
/// one `await_next` at a time. Exits once the actor is gone (`send_message`
/// starts failing) or the agent is unregistered from the bus.
pub async fn spawn_inbox_pump(
	bus: Bus,
	agent_id: AgentId,
	cancellations: Arc<CancellationRegistry>,
	messagebus: MessageBus<TurnEngineActor>,
) {
	loop {
		let token = cancellations.token_for(&agent_id);
		match bus.await_next(&agent_id, &token).await {
			AwaitOutcome::Delivered(env) => {
				if messagebus.send_message(env).await.is_err() {
					info!(%agent_id, "turn engine mailbox closed, stopping inbox pump");
					return;
				}
			},
			AwaitOutcome::Cancelled => {
				if !bus.known_recipients().contains(&agent_id) {
					return;
				}
			},
		}
	}
}

/// Seeds C4 with the agent's system turn. Called once by C9 at spawn time.
pub fn seed_conversation(conversations: &ConversationStore, agent: &Agent) {
	conversations.register(agent.id.clone(), ConversationRecord::system(agent.effective_system_prompt()));
}

pub fn is_active(agent: &Agent) -> bool {
	agent.status == AgentStatus::Active
}

#[cfg(test)]
mod tests {
	use agent_core::{ports::NullPersistence, tools::EmptyToolRegistry, ChatOutcome, RoleId};

	use super::*;

	struct EchoReasoning;

	#[async_trait]
	impl ReasoningService for EchoReasoning {
		async fn chat(&self, _agent_id: &AgentId, request: ChatRequest, _token: CancellationToken) -> ChatOutcome {
			let last = request.messages.last().map(|r| r.content.clone()).unwrap_or_default();
			ChatOutcome::Completed(ChatResponse {
				content: Some(format!("echo: {last}")),
				tool_calls: Vec::new(),
				usage: agent_core::reasoning::Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
				reasoning: None,
			})
		}

		async fn abort(&self, _agent_id: &AgentId) {}
	}

	fn test_config() -> Arc<RuntimeConfig> {
		Arc::new(RuntimeConfig::default())
	}

	#[tokio::test]
	async fn test_run_turn_replies_with_text_and_no_tool_calls() {
		let scheduler = actors::start_scheduler();
		let bus = Bus::new(scheduler);
		let conversations = Arc::new(ConversationStore::new(Some(Arc::new(NullPersistence))));
		let cancellations = Arc::new(CancellationRegistry::new());
		let agent = Agent::new(RoleId::new(), "worker", "you are a worker", Some(AgentId::root()));
		seed_conversation(&conversations, &agent);
		bus.register_recipient(agent.id.clone());
		bus.register_recipient(AgentId::user());

		let mut actor = TurnEngineActor::new(
			agent.id.clone(),
			bus.clone(),
			conversations.clone(),
			cancellations.clone(),
			Arc::new(EchoReasoning),
			Arc::new(EmptyToolRegistry),
			test_config(),
			"test-model".to_string(),
		);

		let draft = EnvelopeDraft::new(AgentId::user(), agent.id.clone(), EnvelopeKind::Text, Payload::text("hello"));
		let env = bus.send(draft).unwrap();
		actor.run_turn(env).await;

		let reply = bus.receive_next(&AgentId::user()).expect("reply expected");
		assert_eq!(reply.payload.as_text(), Some("echo: hello"));
		assert_eq!(actor.compute_status, ComputeStatus::Idle);
		assert_eq!(conversations.len(&agent.id), 3);
	}

	#[tokio::test]
	async fn test_run_turn_honors_cancellation_before_llm_call() {
		let scheduler = actors::start_scheduler();
		let bus = Bus::new(scheduler);
		let conversations = Arc::new(ConversationStore::new(None));
		let cancellations = Arc::new(CancellationRegistry::new());
		let agent = Agent::new(RoleId::new(), "worker", "sys", Some(AgentId::root()));
		seed_conversation(&conversations, &agent);
		bus.register_recipient(agent.id.clone());

		let mut actor = TurnEngineActor::new(
			agent.id.clone(),
			bus.clone(),
			conversations.clone(),
			cancellations.clone(),
			Arc::new(EchoReasoning),
			Arc::new(EmptyToolRegistry),
			test_config(),
			"test-model".to_string(),
		);
		cancellations.abort(&agent.id);

		let draft = EnvelopeDraft::new(AgentId::user(), agent.id.clone(), EnvelopeKind::Text, Payload::text("hi"));
		let env = bus.send(draft).unwrap();
		actor.run_turn(env).await;

		let reply = bus.receive_next(&AgentId::user()).expect("abort reply expected");
		assert_eq!(reply.kind, EnvelopeKind::Abort);
	}

	/// One `echo` tool call, then a final `content`-only response (spec §8 S2).
	struct ToolThenDoneReasoning {
		calls: std::sync::atomic::AtomicU32,
	}

	#[async_trait]
	impl ReasoningService for ToolThenDoneReasoning {
		async fn chat(&self, _agent_id: &AgentId, _request: ChatRequest, _token: CancellationToken) -> ChatOutcome {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);
			if call == 0 {
				ChatOutcome::Completed(ChatResponse {
					content: None,
					tool_calls: vec![agent_core::conversation::ToolCallRequest {
						id: "tc-1".to_string(),
						name: "echo".to_string(),
						args: serde_json::json!({ "s": "x" }),
					}],
					usage: agent_core::reasoning::Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
					reasoning: None,
				})
			} else {
				ChatOutcome::Completed(ChatResponse {
					content: Some("done".to_string()),
					tool_calls: Vec::new(),
					usage: agent_core::reasoning::Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
					reasoning: None,
				})
			}
		}

		async fn abort(&self, _agent_id: &AgentId) {}
	}

	struct EchoToolRegistry;

	#[async_trait]
	impl ToolRegistry for EchoToolRegistry {
		fn list_tools(&self) -> Vec<agent_core::tools::ToolDef> {
			vec![agent_core::tools::ToolDef { name: "echo".to_string(), description: "echoes s".to_string(), parameters: serde_json::json!({}) }]
		}

		async fn execute(
			&self,
			tool_name: &str,
			args: serde_json::Value,
			_ctx: &ToolExecutionContext,
		) -> Result<serde_json::Value, agent_core::tools::ToolError> {
			assert_eq!(tool_name, "echo");
			Ok(args.get("s").cloned().unwrap_or(serde_json::Value::Null))
		}
	}

	#[tokio::test]
	async fn test_run_turn_dispatches_tool_call_then_replies() {
		let scheduler = actors::start_scheduler();
		let bus = Bus::new(scheduler);
		let conversations = Arc::new(ConversationStore::new(None));
		let cancellations = Arc::new(CancellationRegistry::new());
		let agent = Agent::new(RoleId::new(), "worker", "sys", Some(AgentId::root()));
		seed_conversation(&conversations, &agent);
		bus.register_recipient(agent.id.clone());

		let mut actor = TurnEngineActor::new(
			agent.id.clone(),
			bus.clone(),
			conversations.clone(),
			cancellations.clone(),
			Arc::new(ToolThenDoneReasoning { calls: std::sync::atomic::AtomicU32::new(0) }),
			Arc::new(EchoToolRegistry),
			test_config(),
			"test-model".to_string(),
		);

		let draft = EnvelopeDraft::new(AgentId::user(), agent.id.clone(), EnvelopeKind::Text, Payload::text("go"));
		let env = bus.send(draft).unwrap();
		actor.run_turn(env).await;

		// One tool-call observation envelope, then one final text reply, both addressed to the user sink.
		let observation = bus.receive_next(&AgentId::user()).expect("tool observation expected");
		assert_eq!(observation.kind, EnvelopeKind::ToolCall);
		let reply = bus.receive_next(&AgentId::user()).expect("final reply expected");
		assert_eq!(reply.payload.as_text(), Some("done"));

		// §3: [system, user, assistant(tool_calls), tool(result), assistant("done")]
		assert_eq!(conversations.len(&agent.id), 5);
	}

	struct AlwaysToolCallReasoning;

	#[async_trait]
	impl ReasoningService for AlwaysToolCallReasoning {
		async fn chat(&self, _agent_id: &AgentId, _request: ChatRequest, _token: CancellationToken) -> ChatOutcome {
			ChatOutcome::Completed(ChatResponse {
				content: None,
				tool_calls: vec![agent_core::conversation::ToolCallRequest {
					id: "tc".to_string(),
					name: "echo".to_string(),
					args: serde_json::json!({ "s": "x" }),
				}],
				usage: agent_core::reasoning::Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
				reasoning: None,
			})
		}

		async fn abort(&self, _agent_id: &AgentId) {}
	}

	#[tokio::test]
	async fn test_run_turn_emits_error_when_max_tool_rounds_exceeded() {
		let scheduler = actors::start_scheduler();
		let bus = Bus::new(scheduler);
		let conversations = Arc::new(ConversationStore::new(None));
		let cancellations = Arc::new(CancellationRegistry::new());
		let agent = Agent::new(RoleId::new(), "worker", "sys", Some(AgentId::root()));
		seed_conversation(&conversations, &agent);
		bus.register_recipient(agent.id.clone());

		let mut config = RuntimeConfig::default();
		config.max_tool_rounds = 2;

		let mut actor = TurnEngineActor::new(
			agent.id.clone(),
			bus.clone(),
			conversations.clone(),
			cancellations.clone(),
			Arc::new(AlwaysToolCallReasoning),
			Arc::new(EchoToolRegistry),
			Arc::new(config),
			"test-model".to_string(),
		);

		let draft = EnvelopeDraft::new(AgentId::user(), agent.id.clone(), EnvelopeKind::Text, Payload::text("go"));
		let env = bus.send(draft).unwrap();
		actor.run_turn(env).await;

		// Drain tool observation envelopes, then expect the terminal error reply.
		let mut last = None;
		while let Some(env) = bus.receive_next(&AgentId::user()) {
			last = Some(env);
		}
		let last = last.expect("at least one envelope expected");
		assert_eq!(last.kind, EnvelopeKind::Error);
	}
}
