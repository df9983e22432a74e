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

//! Opaque identifiers. Each is a thin newtype over a `common::new_quid`-generated
//! string, so callers cannot accidentally pass an AgentId where a TaskId is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
	($name:ident, $prefix:literal) => {
		#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
		pub struct $name(String);

		impl $name {
			pub fn new() -> Self {
				$name(common::new_quid($prefix))
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}

		impl From<String> for $name {
			fn from(value: String) -> Self {
				$name(value)
			}
		}

		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				$name(value.to_string())
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}
	};
}

opaque_id!(AgentId, "agent");
opaque_id!(RoleId, "role");
opaque_id!(TaskId, "task");
opaque_id!(MessageId, "msg");

impl AgentId {
	/// The top-level reasoning agent. Has no parent.
	pub fn root() -> AgentId {
		AgentId("root".to_string())
	}

	/// The sentinel human endpoint. Has no parent; always a valid `send` recipient.
	pub fn user() -> AgentId {
		AgentId("user".to_string())
	}

	pub fn is_root(&self) -> bool {
		self.0 == "root"
	}

	pub fn is_user(&self) -> bool {
		self.0 == "user"
	}

	/// Neither sentinel may be spawned, parented-to-nothing-else, or terminated.
	pub fn is_sentinel(&self) -> bool {
		self.is_root() || self.is_user()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_ids_are_unique() {
		let a = AgentId::new();
		let b = AgentId::new();
		assert_ne!(a, b);
	}

	#[test]
	fn test_sentinels() {
		assert!(AgentId::root().is_sentinel());
		assert!(AgentId::user().is_sentinel());
		assert!(!AgentId::new().is_sentinel());
	}
}
