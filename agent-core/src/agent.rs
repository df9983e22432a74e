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

//! The live agent record (§3). The parent pointer is set at creation and
//! never changes; the parent graph is an acyclic forest rooted at `root`
//! and `user`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, RoleId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
	Active,
	Terminated,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeStatus {
	Idle,
	Processing,
	WaitingLlm,
	Stopping,
	Stopped,
	Terminating,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
	pub id: AgentId,
	#[serde(rename = "roleId")]
	pub role_id: RoleId,
	#[serde(rename = "roleName")]
	pub role_name: String,
	pub prompt: String,
	#[serde(rename = "parentAgentId")]
	pub parent_agent_id: Option<AgentId>,
	#[serde(rename = "createdAt")]
	pub created_at: DateTime<Utc>,
	pub status: AgentStatus,
	#[serde(rename = "computeStatus")]
	pub compute_status: ComputeStatus,
	#[serde(rename = "customName")]
	pub custom_name: Option<String>,
	#[serde(rename = "systemPromptAppendix")]
	pub system_prompt_appendix: Option<String>,
}

impl Agent {
	pub fn new(
		role_id: RoleId,
		role_name: impl Into<String>,
		prompt: impl Into<String>,
		parent_agent_id: Option<AgentId>,
	) -> Self {
		Agent {
			id: AgentId::new(),
			role_id,
			role_name: role_name.into(),
			prompt: prompt.into(),
			parent_agent_id,
			created_at: Utc::now(),
			status: AgentStatus::Active,
			compute_status: ComputeStatus::Idle,
			custom_name: None,
			system_prompt_appendix: None,
		}
	}

	pub fn sentinel_root() -> Self {
		Agent {
			id: AgentId::root(),
			role_id: RoleId::from("role-root"),
			role_name: "root".to_string(),
			prompt: String::new(),
			parent_agent_id: None,
			created_at: Utc::now(),
			status: AgentStatus::Active,
			compute_status: ComputeStatus::Idle,
			custom_name: Some("root".to_string()),
			system_prompt_appendix: None,
		}
	}

	pub fn sentinel_user() -> Self {
		Agent {
			id: AgentId::user(),
			role_id: RoleId::from("role-user"),
			role_name: "user".to_string(),
			prompt: String::new(),
			parent_agent_id: None,
			created_at: Utc::now(),
			status: AgentStatus::Active,
			compute_status: ComputeStatus::Idle,
			custom_name: Some("user".to_string()),
			system_prompt_appendix: None,
		}
	}

	pub fn effective_system_prompt(&self) -> String {
		match &self.system_prompt_appendix {
			Some(appendix) if !appendix.is_empty() => format!("{}\n\n{}", self.prompt, appendix),
			_ => self.prompt.clone(),
		}
	}
}
