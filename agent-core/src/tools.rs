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

//! The tool dispatch registry interface (C7). `agent-runtime` implements this
//! trait twice over: once per externally registered tool module, and once
//! for the six platform tools that need direct access to the lifecycle
//! manager's internals. Both are merged into the single registry the turn
//! engine holds, so dispatch never needs to know which kind a tool name
//! resolves to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{cancellation::CancellationToken, ids::{AgentId, MessageId, TaskId}};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDef {
	pub name: String,
	pub description: String,
	/// JSON-schema argument spec.
	pub parameters: serde_json::Value,
}

/// Passed to every tool execution: addressing plus a handle to the
/// cancellation token so cooperative tools can honor a mid-flight abort.
#[derive(Clone)]
pub struct ToolExecutionContext {
	pub agent_id: AgentId,
	pub task_id: Option<TaskId>,
	pub message_id: MessageId,
	pub cancellation_token: CancellationToken,
}

#[derive(Clone, Debug)]
pub struct ToolError {
	pub message: String,
}

impl ToolError {
	pub fn new(message: impl Into<String>) -> Self {
		ToolError { message: message.into() }
	}
}

impl std::fmt::Display for ToolError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.message)
	}
}

impl std::error::Error for ToolError {}

/// `listTools() -> [ToolDef]`, `execute(toolName, args, ctx) -> result |
/// error` from §4.7. External modules register additional tool groups
/// against this trait; the platform tools are merged in separately.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
	fn list_tools(&self) -> Vec<ToolDef>;

	async fn execute(
		&self,
		tool_name: &str,
		args: serde_json::Value,
		ctx: &ToolExecutionContext,
	) -> Result<serde_json::Value, ToolError>;
}

/// A registry with nothing registered, useful as a default and in tests
/// that only exercise platform tools.
#[derive(Default)]
pub struct EmptyToolRegistry;

#[async_trait]
impl ToolRegistry for EmptyToolRegistry {
	fn list_tools(&self) -> Vec<ToolDef> {
		Vec::new()
	}

	async fn execute(
		&self,
		tool_name: &str,
		_args: serde_json::Value,
		_ctx: &ToolExecutionContext,
	) -> Result<serde_json::Value, ToolError> {
		Err(ToolError::new(format!("unknown tool '{tool_name}'")))
	}
}
