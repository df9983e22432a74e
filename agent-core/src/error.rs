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

//! The error taxonomy every turn can surface, plus the envelope payload shape
//! used to report it back to an originator.

use std::sync::Arc;

use common::error::{ServiceError, ServiceErrorCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::AgentId;

/// One variant per `errorType` row. Stable, serializable string keys are
/// derived from these via [`CoreErrorKind::as_str`] — external consumers
/// (persistence, UI) key off the string, not the Rust discriminant.
#[derive(Error, Debug, Clone)]
pub enum CoreErrorKind {
	#[error("llm call failed after {attempts} attempt(s)")]
	LlmCallFailed { attempts: u32 },

	#[error("llm call aborted")]
	LlmCallAborted,

	#[error("context limit exceeded even after compression")]
	ContextLimitExceeded,

	#[error("max tool rounds exceeded")]
	MaxToolRoundsExceeded,

	#[error("agent message processing failed")]
	AgentMessageProcessingFailed,

	#[error("tool '{tool_name}' execution failed")]
	ToolExecutionFailed { tool_name: String },

	#[error("unknown recipient")]
	UnknownRecipient,

	#[error("recipient is terminating")]
	RecipientTerminating,

	#[error("parent agent not found")]
	ParentNotFound,

	#[error("role not found")]
	RoleNotFound,

	#[error("agent not found")]
	AgentNotFound,

	#[error("cannot terminate a sentinel agent")]
	SentinelAgent,

	#[error("runtime is shutting down")]
	ShuttingDown,
}

impl CoreErrorKind {
	/// The stable `errorType` string per §7 / §6's error taxonomy keys.
	pub fn as_str(&self) -> &'static str {
		match self {
			CoreErrorKind::LlmCallFailed { .. } => "llm_call_failed",
			CoreErrorKind::LlmCallAborted => "llm_call_aborted",
			CoreErrorKind::ContextLimitExceeded => "context_limit_exceeded",
			CoreErrorKind::MaxToolRoundsExceeded => "max_tool_rounds_exceeded",
			CoreErrorKind::AgentMessageProcessingFailed => "agent_message_processing_failed",
			CoreErrorKind::ToolExecutionFailed { .. } => "tool_execution_failed",
			CoreErrorKind::UnknownRecipient => "unknown_recipient",
			CoreErrorKind::RecipientTerminating => "recipient_terminating",
			CoreErrorKind::ParentNotFound => "parent_not_found",
			CoreErrorKind::RoleNotFound => "role_not_found",
			CoreErrorKind::AgentNotFound => "agent_not_found",
			CoreErrorKind::SentinelAgent => "cannot_terminate_sentinel",
			CoreErrorKind::ShuttingDown => "shutting_down",
		}
	}

	/// Whether this kind is ever surfaced to a sender's turn. Bus-level
	/// delivery rejections (`unknown_recipient`, `recipient_terminating`) are
	/// logged and dropped instead, per §4.2.
	pub fn is_raised_to_sender(&self) -> bool {
		!matches!(self, CoreErrorKind::UnknownRecipient | CoreErrorKind::RecipientTerminating)
	}
}

/// The core's own error type: a [`CoreErrorKind`] plus an optional causal
/// chain, cheaply cloneable so the same error can be logged, persisted, and
/// rendered into an error envelope without re-deriving it three times.
#[derive(Clone, Debug)]
pub struct CoreError {
	pub kind: CoreErrorKind,
	pub agent_id: Option<AgentId>,
	source: Option<Arc<anyhow::Error>>,
}

impl CoreError {
	pub fn new(kind: CoreErrorKind) -> Self {
		CoreError { kind, agent_id: None, source: None }
	}

	pub fn with_agent(mut self, agent_id: AgentId) -> Self {
		self.agent_id = Some(agent_id);
		self
	}

	pub fn with_source(mut self, source: anyhow::Error) -> Self {
		self.source = Some(Arc::new(source));
		self
	}

	pub fn kind(&self) -> &CoreErrorKind {
		&self.kind
	}

	/// A user-facing message, distinct from the diagnostic `source` chain —
	/// per §7, "every error envelope carries a user-facing message plus
	/// diagnostic fields".
	pub fn user_message(&self) -> String {
		self.kind.to_string()
	}
}

impl std::fmt::Display for CoreError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.kind)?;
		if let Some(source) = &self.source {
			write!(f, ": {source}")?;
		}
		Ok(())
	}
}

impl std::error::Error for CoreError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source.as_ref().map(|arc| arc.as_ref() as &(dyn std::error::Error + 'static))
	}
}

impl From<CoreErrorKind> for CoreError {
	fn from(kind: CoreErrorKind) -> Self {
		CoreError::new(kind)
	}
}

impl ServiceError for CoreError {
	fn error_code(&self) -> ServiceErrorCode {
		match self.kind {
			CoreErrorKind::LlmCallFailed { .. } => ServiceErrorCode::Unavailable,
			CoreErrorKind::LlmCallAborted => ServiceErrorCode::BadRequest,
			CoreErrorKind::ContextLimitExceeded => ServiceErrorCode::BadRequest,
			CoreErrorKind::MaxToolRoundsExceeded => ServiceErrorCode::BadRequest,
			CoreErrorKind::AgentMessageProcessingFailed => ServiceErrorCode::Internal,
			CoreErrorKind::ToolExecutionFailed { .. } => ServiceErrorCode::Internal,
			CoreErrorKind::UnknownRecipient => ServiceErrorCode::NotFound,
			CoreErrorKind::RecipientTerminating => ServiceErrorCode::NotFound,
			CoreErrorKind::ParentNotFound => ServiceErrorCode::NotFound,
			CoreErrorKind::RoleNotFound => ServiceErrorCode::NotFound,
			CoreErrorKind::AgentNotFound => ServiceErrorCode::NotFound,
			CoreErrorKind::SentinelAgent => ServiceErrorCode::BadRequest,
			CoreErrorKind::ShuttingDown => ServiceErrorCode::Unavailable,
		}
	}
}

/// The `{kind: "error", errorType, message, ...}` payload shape from §6,
/// serialized into an error [`crate::envelope::Envelope`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub kind: &'static str,
	#[serde(rename = "errorType")]
	pub error_type: String,
	pub message: String,
	#[serde(rename = "errorName", skip_serializing_if = "Option::is_none")]
	pub error_name: Option<String>,
	#[serde(rename = "originalError", skip_serializing_if = "Option::is_none")]
	pub original_error: Option<String>,
	#[serde(rename = "agentId", skip_serializing_if = "Option::is_none")]
	pub agent_id: Option<String>,
	pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&CoreError> for ErrorPayload {
	fn from(err: &CoreError) -> Self {
		ErrorPayload {
			kind: "error",
			error_type: err.kind.as_str().to_string(),
			message: err.user_message(),
			error_name: None,
			original_error: err.source.as_ref().map(|s| s.to_string()),
			agent_id: err.agent_id.as_ref().map(|a| a.to_string()),
			timestamp: chrono::Utc::now(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_type_strings_are_stable() {
		assert_eq!(CoreErrorKind::LlmCallFailed { attempts: 3 }.as_str(), "llm_call_failed");
		assert_eq!(CoreErrorKind::UnknownRecipient.as_str(), "unknown_recipient");
	}

	#[test]
	fn test_bus_level_errors_not_raised_to_sender() {
		assert!(!CoreErrorKind::UnknownRecipient.is_raised_to_sender());
		assert!(!CoreErrorKind::RecipientTerminating.is_raised_to_sender());
		assert!(CoreErrorKind::LlmCallAborted.is_raised_to_sender());
	}

	#[test]
	fn test_error_payload_carries_user_message() {
		let err = CoreError::new(CoreErrorKind::MaxToolRoundsExceeded).with_agent(AgentId::new());
		let payload = ErrorPayload::from(&err);
		assert_eq!(payload.error_type, "max_tool_rounds_exceeded");
		assert!(payload.agent_id.is_some());
	}
}
