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

//! Immutable message envelopes (C1). Envelopes are never mutated once
//! enqueued by the bus; a "modification" always produces a new envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, MessageId, TaskId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
	Text,
	ToolCall,
	Error,
	Abort,
	System,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
	Normal,
	High,
}

impl Default for Priority {
	fn default() -> Self {
		Priority::Normal
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
	Image,
	File,
}

/// `{artifactRef: "workspace:<relativePath>" | "artifact:<id>", type, filename}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
	#[serde(rename = "artifactRef")]
	pub artifact_ref: String,
	#[serde(rename = "type")]
	pub attachment_type: AttachmentType,
	pub filename: String,
}

/// A structured envelope payload. `payload` in §3 is described as "typically
/// `{text}` or `{toolName, args, result, usage}`"; the error and abort shapes
/// are added from §6 so every `kind` has a matching payload variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
	Text {
		text: String,
	},
	ToolCall {
		#[serde(rename = "toolName")]
		tool_name: String,
		args: serde_json::Value,
		result: serde_json::Value,
		#[serde(skip_serializing_if = "Option::is_none")]
		usage: Option<crate::reasoning::Usage>,
	},
	Error(crate::error::ErrorPayload),
	Abort {
		kind: &'static str,
		message: String,
	},
	Raw(serde_json::Value),
}

impl Payload {
	pub fn text(text: impl Into<String>) -> Self {
		Payload::Text { text: text.into() }
	}

	pub fn abort(message: impl Into<String>) -> Self {
		Payload::Abort { kind: "abort", message: message.into() }
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			Payload::Text { text } => Some(text.as_str()),
			_ => None,
		}
	}
}

/// `{id, from, to, taskId, payload, kind, createdAt, scheduledDeliveryAt?,
/// priority, attachments?}` from §3. Constructed via [`EnvelopeDraft`]; the
/// bus stamps `id`/`created_at` if absent, per §4.1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
	pub id: MessageId,
	pub from: AgentId,
	pub to: AgentId,
	#[serde(rename = "taskId")]
	pub task_id: Option<TaskId>,
	pub payload: Payload,
	pub kind: EnvelopeKind,
	#[serde(rename = "createdAt")]
	pub created_at: DateTime<Utc>,
	#[serde(rename = "scheduledDeliveryAt", skip_serializing_if = "Option::is_none")]
	pub scheduled_delivery_at: Option<DateTime<Utc>>,
	pub priority: Priority,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub attachments: Option<Vec<Attachment>>,
}

/// A partial envelope a caller supplies to [`crate::bus::Bus::send`]; `id`
/// and `created_at` are stamped by the bus on enqueue.
#[derive(Clone, Debug)]
pub struct EnvelopeDraft {
	pub from: AgentId,
	pub to: AgentId,
	pub task_id: Option<TaskId>,
	pub payload: Payload,
	pub kind: EnvelopeKind,
	pub scheduled_delivery_at: Option<DateTime<Utc>>,
	pub priority: Priority,
	pub attachments: Option<Vec<Attachment>>,
}

impl EnvelopeDraft {
	pub fn new(from: AgentId, to: AgentId, kind: EnvelopeKind, payload: Payload) -> Self {
		EnvelopeDraft {
			from,
			to,
			task_id: None,
			payload,
			kind,
			scheduled_delivery_at: None,
			priority: Priority::Normal,
			attachments: None,
		}
	}

	pub fn with_task(mut self, task_id: TaskId) -> Self {
		self.task_id = Some(task_id);
		self
	}

	pub fn with_priority(mut self, priority: Priority) -> Self {
		self.priority = priority;
		self
	}

	pub fn with_scheduled_delivery(mut self, at: DateTime<Utc>) -> Self {
		self.scheduled_delivery_at = Some(at);
		self
	}

	pub(crate) fn into_envelope(self) -> Envelope {
		Envelope {
			id: MessageId::new(),
			from: self.from,
			to: self.to,
			task_id: self.task_id,
			payload: self.payload,
			kind: self.kind,
			created_at: Utc::now(),
			scheduled_delivery_at: self.scheduled_delivery_at,
			priority: self.priority,
			attachments: self.attachments,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_draft_stamps_id_and_timestamp() {
		let draft = EnvelopeDraft::new(
			AgentId::user(),
			AgentId::root(),
			EnvelopeKind::Text,
			Payload::text("hello"),
		);
		let env = draft.into_envelope();
		assert!(!env.id.as_str().is_empty());
		assert_eq!(env.payload.as_text(), Some("hello"));
		assert_eq!(env.priority, Priority::Normal);
	}
}
