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

//! The six platform tools from §4.7: `spawn_agent`, `spawn_agent_with_task`,
//! `terminate_agent`, `send_message_to_agent`, `get_system_prompt_appendix`,
//! `set_system_prompt_appendix`. Every turn's tool registry is this type
//! wrapping a `Weak<LifecycleManager>` plus whatever external modules the
//! host registered, merged so C8 never needs to know which kind a tool name
//! resolves to.
//!
//! Platform tools execute inline within the calling agent's turn and mutate
//! C9's state directly (§4.7's "reentrancy of platform tools" note) — the
//! `Weak` upgrade only fails once the manager itself has been torn down,
//! which cannot happen while one of its own turn engines is still running a
//! tool call.

use std::sync::{Arc, Weak};

use agent_core::{
	tools::{ToolDef, ToolError, ToolExecutionContext, ToolRegistry},
	AgentId, RoleId, TaskId,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::lifecycle::LifecycleManager;

fn schema(properties: serde_json::Value, required: &[&str]) -> serde_json::Value {
	json!({ "type": "object", "properties": properties, "required": required })
}

fn platform_tool_defs() -> Vec<ToolDef> {
	vec![
		ToolDef {
			name: "spawn_agent".to_string(),
			description: "Spawns a new sub-agent from a role, parented to the calling agent.".to_string(),
			parameters: schema(
				json!({
					"roleId": { "type": "string" },
					"customName": { "type": "string" },
				}),
				&["roleId"],
			),
		},
		ToolDef {
			name: "spawn_agent_with_task".to_string(),
			description: "Spawns a new sub-agent from a role and immediately sends it a text task.".to_string(),
			parameters: schema(
				json!({
					"roleId": { "type": "string" },
					"task": { "type": "string" },
					"customName": { "type": "string" },
				}),
				&["roleId", "task"],
			),
		},
		ToolDef {
			name: "terminate_agent".to_string(),
			description: "Force-terminates an agent and its subtree.".to_string(),
			parameters: schema(json!({ "agentId": { "type": "string" } }), &["agentId"]),
		},
		ToolDef {
			name: "send_message_to_agent".to_string(),
			description: "Sends a text message to another agent or to the user.".to_string(),
			parameters: schema(
				json!({ "agentId": { "type": "string" }, "text": { "type": "string" } }),
				&["agentId", "text"],
			),
		},
		ToolDef {
			name: "get_system_prompt_appendix".to_string(),
			description: "Reads the calling agent's current system prompt appendix.".to_string(),
			parameters: schema(json!({}), &[]),
		},
		ToolDef {
			name: "set_system_prompt_appendix".to_string(),
			description: "Replaces the calling agent's system prompt appendix.".to_string(),
			parameters: schema(json!({ "appendix": { "type": "string" } }), &["appendix"]),
		},
	]
}

#[derive(Deserialize)]
struct SpawnAgentArgs {
	#[serde(rename = "roleId")]
	role_id: String,
	#[serde(rename = "customName")]
	custom_name: Option<String>,
}

#[derive(Deserialize)]
struct SpawnAgentWithTaskArgs {
	#[serde(rename = "roleId")]
	role_id: String,
	task: String,
	#[serde(rename = "customName")]
	custom_name: Option<String>,
}

#[derive(Deserialize)]
struct TerminateAgentArgs {
	#[serde(rename = "agentId")]
	agent_id: String,
}

#[derive(Deserialize)]
struct SendMessageArgs {
	#[serde(rename = "agentId")]
	agent_id: String,
	text: String,
}

#[derive(Deserialize)]
struct SetAppendixArgs {
	appendix: String,
}

fn bad_args(tool_name: &str, err: impl std::fmt::Display) -> ToolError {
	ToolError::new(format!("invalid arguments for '{tool_name}': {err}"))
}

/// Merges the platform tools with every externally registered module into
/// one [`ToolRegistry`]. Built fresh per agent spawn (see
/// `LifecycleManager::build_tool_registry`) so the module list reflects
/// whatever was registered up to that point.
pub struct PlatformToolRegistry {
	lifecycle: Weak<LifecycleManager>,
	modules: Vec<Arc<dyn ToolRegistry>>,
}

impl PlatformToolRegistry {
	pub fn new(lifecycle: Weak<LifecycleManager>, modules: Vec<Arc<dyn ToolRegistry>>) -> Self {
		PlatformToolRegistry { lifecycle, modules }
	}

	fn manager(&self) -> Result<Arc<LifecycleManager>, ToolError> {
		self.lifecycle.upgrade().ok_or_else(|| ToolError::new("runtime is shutting down"))
	}

	async fn execute_platform_tool(
		&self,
		tool_name: &str,
		args: serde_json::Value,
		ctx: &ToolExecutionContext,
	) -> Result<serde_json::Value, ToolError> {
		let manager = self.manager()?;
		match tool_name {
			"spawn_agent" => {
				let args: SpawnAgentArgs = serde_json::from_value(args).map_err(|e| bad_args(tool_name, e))?;
				let agent = manager
					.spawn(&RoleId::from(args.role_id), ctx.agent_id.clone(), args.custom_name)
					.map_err(|e| ToolError::new(e.to_string()))?;
				Ok(json!({ "agentId": agent.id.to_string() }))
			},
			"spawn_agent_with_task" => {
				let args: SpawnAgentWithTaskArgs = serde_json::from_value(args).map_err(|e| bad_args(tool_name, e))?;
				let agent = manager
					.spawn(&RoleId::from(args.role_id), ctx.agent_id.clone(), args.custom_name)
					.map_err(|e| ToolError::new(e.to_string()))?;
				manager
					.send_message(ctx.agent_id.clone(), agent.id.clone(), args.task, ctx.task_id.clone())
					.map_err(|e| ToolError::new(e.to_string()))?;
				Ok(json!({ "agentId": agent.id.to_string() }))
			},
			"terminate_agent" => {
				let args: TerminateAgentArgs = serde_json::from_value(args).map_err(|e| bad_args(tool_name, e))?;
				let receipt = manager
					.force_terminate_agent(&AgentId::from(args.agent_id))
					.await
					.map_err(|e| ToolError::new(e.to_string()))?;
				Ok(json!({
					"agentId": receipt.agent_id.to_string(),
					"terminated": receipt.terminated.iter().map(ToString::to_string).collect::<Vec<_>>(),
				}))
			},
			"send_message_to_agent" => {
				let args: SendMessageArgs = serde_json::from_value(args).map_err(|e| bad_args(tool_name, e))?;
				let env = manager
					.send_message(ctx.agent_id.clone(), AgentId::from(args.agent_id), args.text, ctx.task_id.clone())
					.map_err(|e| ToolError::new(e.to_string()))?;
				Ok(json!({ "envelopeId": env.id.to_string() }))
			},
			"get_system_prompt_appendix" => {
				let appendix = manager.get_system_prompt_appendix(&ctx.agent_id).map_err(|e| ToolError::new(e.to_string()))?;
				Ok(json!({ "appendix": appendix }))
			},
			"set_system_prompt_appendix" => {
				let args: SetAppendixArgs = serde_json::from_value(args).map_err(|e| bad_args(tool_name, e))?;
				manager
					.set_system_prompt_appendix(&ctx.agent_id, Some(args.appendix))
					.map_err(|e| ToolError::new(e.to_string()))?;
				Ok(json!({ "ok": true }))
			},
			_ => Err(ToolError::new(format!("unknown platform tool '{tool_name}'"))),
		}
	}
}

const PLATFORM_TOOL_NAMES: [&str; 6] = [
	"spawn_agent",
	"spawn_agent_with_task",
	"terminate_agent",
	"send_message_to_agent",
	"get_system_prompt_appendix",
	"set_system_prompt_appendix",
];

#[async_trait]
impl ToolRegistry for PlatformToolRegistry {
	fn list_tools(&self) -> Vec<ToolDef> {
		let mut tools = platform_tool_defs();
		for module in &self.modules {
			tools.extend(module.list_tools());
		}
		tools
	}

	async fn execute(
		&self,
		tool_name: &str,
		args: serde_json::Value,
		ctx: &ToolExecutionContext,
	) -> Result<serde_json::Value, ToolError> {
		if PLATFORM_TOOL_NAMES.contains(&tool_name) {
			return self.execute_platform_tool(tool_name, args, ctx).await;
		}
		for module in &self.modules {
			if module.list_tools().iter().any(|def| def.name == tool_name) {
				return module.execute(tool_name, args, ctx).await;
			}
		}
		Err(ToolError::new(format!("unknown tool '{tool_name}'")))
	}
}

#[cfg(test)]
mod tests {
	use agent_core::{cancellation::CancellationToken, CancellationRegistry, ConversationStore, ConversationRecord, MessageId, ReasoningService, ChatOutcome, ChatRequest, ChatResponse, Usage, Bus};

	use super::*;
	use crate::config::RuntimeConfig;

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

	fn test_manager() -> (actors::Querent, Arc<LifecycleManager>) {
		let querent = actors::Querent::with_accelerated_time();
		let bus = Bus::new(actors::start_scheduler());
		bus.register_recipient(AgentId::root());
		let conversations = Arc::new(ConversationStore::new(None));
		conversations.register(AgentId::root(), ConversationRecord::system(""));
		conversations.register(AgentId::user(), ConversationRecord::system(""));
		let cancellations = Arc::new(CancellationRegistry::new());
		let config = Arc::new(RuntimeConfig::default());
		let manager = LifecycleManager::new(querent.spawn_ctx().clone(), bus, conversations, cancellations, Arc::new(EchoReasoning), config, None);
		(querent, manager)
	}

	fn ctx_for(agent_id: AgentId) -> ToolExecutionContext {
		ToolExecutionContext {
			agent_id: agent_id.clone(),
			task_id: None,
			message_id: MessageId::new(),
			cancellation_token: CancellationRegistry::new().token_for(&agent_id),
		}
	}

	#[tokio::test]
	async fn test_list_tools_includes_all_six_platform_tools() {
		let (querent, manager) = test_manager();
		let registry = PlatformToolRegistry::new(Arc::downgrade(&manager), Vec::new());
		let names: Vec<String> = registry.list_tools().into_iter().map(|t| t.name).collect();
		for expected in PLATFORM_TOOL_NAMES {
			assert!(names.contains(&expected.to_string()), "missing {expected}");
		}
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_spawn_agent_tool_creates_child_of_caller() {
		let (querent, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let registry = PlatformToolRegistry::new(Arc::downgrade(&manager), Vec::new());
		let ctx = ctx_for(AgentId::root());
		let args = json!({ "roleId": role.id.to_string() });
		let result = registry.execute("spawn_agent", args, &ctx).await.unwrap();
		let agent_id = AgentId::from(result["agentId"].as_str().unwrap().to_string());
		assert!(manager.get_agent(&agent_id).is_some());
		manager.force_terminate_agent(&agent_id).await.unwrap();
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_set_then_get_system_prompt_appendix_round_trips() {
		let (querent, manager) = test_manager();
		let role = manager.create_role("worker", "sys", vec![], None);
		let agent = manager.spawn(&role.id, AgentId::root(), None).unwrap();
		let registry = PlatformToolRegistry::new(Arc::downgrade(&manager), Vec::new());
		let ctx = ctx_for(agent.id.clone());

		registry.execute("set_system_prompt_appendix", json!({ "appendix": "be terse" }), &ctx).await.unwrap();
		let result = registry.execute("get_system_prompt_appendix", json!({}), &ctx).await.unwrap();
		assert_eq!(result["appendix"], "be terse");

		manager.force_terminate_agent(&agent.id).await.unwrap();
		querent.quit().await;
	}

	#[tokio::test]
	async fn test_unknown_tool_name_is_rejected() {
		let (querent, manager) = test_manager();
		let registry = PlatformToolRegistry::new(Arc::downgrade(&manager), Vec::new());
		let ctx = ctx_for(AgentId::root());
		assert!(registry.execute("not_a_tool", json!({}), &ctx).await.is_err());
		querent.quit().await;
	}
}
