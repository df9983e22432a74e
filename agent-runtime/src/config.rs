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

//! `RuntimeConfig`: the shape every "Configuration input" from §6 must
//! produce. Loading it from a file (watching, CLI overrides) is out of
//! scope for the core; this struct is what `agent-cli` deserializes into
//! and what C9/C10 consume directly.

use std::path::Path;

use agent_core::CompressionConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningServiceDescriptor {
	pub id: String,
	pub name: String,
	#[serde(rename = "baseURL")]
	pub base_url: String,
	pub model: String,
	#[serde(rename = "apiKey", skip_serializing_if = "Option::is_none")]
	pub api_key: Option<String>,
	#[serde(rename = "maxConcurrentRequests", default = "default_max_concurrent_requests")]
	pub max_concurrent_requests: u32,
	pub capabilities: ReasoningCapabilities,
}

fn default_max_concurrent_requests() -> u32 {
	4
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReasoningCapabilities {
	#[serde(default)]
	pub input: Vec<String>,
	#[serde(default)]
	pub output: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
	/// Global ceiling on total turns per submission.
	#[serde(default = "default_max_steps")]
	pub max_steps: u32,
	/// Per-turn ceiling on tool dispatch rounds.
	#[serde(default = "default_max_tool_rounds")]
	pub max_tool_rounds: u32,
	#[serde(default = "default_shutdown_timeout_ms")]
	pub shutdown_timeout_ms: u64,
	#[serde(default)]
	pub auto_compression: CompressionConfig,
	#[serde(default)]
	pub reasoning_services: Vec<ReasoningServiceDescriptor>,
	/// Default reasoning model name when a role does not pin one.
	#[serde(default = "default_system_model")]
	pub default_model: String,
	/// Default reasoning-call timeout, per §5 (default 120s).
	#[serde(default = "default_reasoning_timeout_secs")]
	pub reasoning_timeout_secs: u64,
	#[serde(default = "default_runtime_dir")]
	pub runtime_dir: String,
}

fn default_max_steps() -> u32 {
	200
}

fn default_max_tool_rounds() -> u32 {
	20_000
}

fn default_shutdown_timeout_ms() -> u64 {
	30_000
}

fn default_system_model() -> String {
	"default".to_string()
}

fn default_reasoning_timeout_secs() -> u64 {
	120
}

fn default_runtime_dir() -> String {
	common::runtime_data_dir().to_string_lossy().to_string()
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		RuntimeConfig {
			max_steps: default_max_steps(),
			max_tool_rounds: default_max_tool_rounds(),
			shutdown_timeout_ms: default_shutdown_timeout_ms(),
			auto_compression: CompressionConfig::default(),
			reasoning_services: Vec::new(),
			default_model: default_system_model(),
			reasoning_timeout_secs: default_reasoning_timeout_secs(),
			runtime_dir: default_runtime_dir(),
		}
	}
}

impl RuntimeConfig {
	/// Loads from a YAML or TOML file, inferred from its extension —
	/// matching the `serde_yaml`/`toml` pairing already in this workspace's
	/// dependency stack rather than picking just one format.
	pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
		let path = path.as_ref();
		let contents = std::fs::read_to_string(path)
			.with_context(|| format!("reading runtime config at {}", path.display()))?;
		match path.extension().and_then(|ext| ext.to_str()) {
			Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)
				.with_context(|| format!("parsing YAML runtime config at {}", path.display())),
			Some("toml") => toml::from_str(&contents)
				.with_context(|| format!("parsing TOML runtime config at {}", path.display())),
			other => anyhow::bail!("unsupported runtime config extension: {other:?}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_match_spec() {
		let config = RuntimeConfig::default();
		assert_eq!(config.max_steps, 200);
		assert_eq!(config.max_tool_rounds, 20_000);
		assert_eq!(config.shutdown_timeout_ms, 30_000);
		assert_eq!(config.auto_compression.threshold, 0.85);
		assert_eq!(config.auto_compression.keep_recent_count, 10);
	}

	#[test]
	fn test_load_from_yaml_applies_overrides_and_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("runtime.yaml");
		std::fs::write(&path, "max_steps: 42\nmax_tool_rounds: 7\n").unwrap();
		let config = RuntimeConfig::load_from_file(&path).unwrap();
		assert_eq!(config.max_steps, 42);
		assert_eq!(config.max_tool_rounds, 7);
		assert_eq!(config.shutdown_timeout_ms, 30_000);
	}

	#[test]
	fn test_unsupported_extension_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("runtime.json");
		std::fs::write(&path, "{}").unwrap();
		assert!(RuntimeConfig::load_from_file(&path).is_err());
	}
}
