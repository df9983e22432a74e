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

//! Role templates (§3): named capability templates agents instantiate.
//! Deletion is soft — an inactive role stays in the table for agents
//! already instantiated from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RoleId;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Role {
	pub id: RoleId,
	pub name: String,
	pub prompt: String,
	pub capabilities: Vec<String>,
	#[serde(rename = "createdBy")]
	pub created_by: Option<String>,
	#[serde(rename = "createdAt")]
	pub created_at: DateTime<Utc>,
	pub active: bool,
}

impl Role {
	pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
		Role {
			id: RoleId::new(),
			name: name.into(),
			prompt: prompt.into(),
			capabilities: Vec::new(),
			created_by: None,
			created_at: Utc::now(),
			active: true,
		}
	}

	pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
		self.capabilities = capabilities;
		self
	}
}
