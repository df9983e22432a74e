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

use std::sync::Arc;

use agent_core::{AgentId, Envelope, ObserverPort};
use agent_runtime::{AgentRuntime, RuntimeConfig};
use clap::{arg, ArgMatches, Command};
use common::{initialize_runtimes, RuntimesConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::reasoning::LoopbackReasoningService;

pub fn build_serve_command() -> Command {
	Command::new("serve")
		.about("Starts an agent runtime and serves one root-spawned agent over stdin/stdout.")
		.arg(arg!(-c --config <PATH> "Path to a RuntimeConfig YAML or TOML file").required(false))
		.arg(arg!(-r --role <NAME> "Name of the role to spawn under root").required(false))
		.arg(
			arg!(-p --prompt <PROMPT> "System prompt for the spawned role")
				.required(false)
				.default_value("You are a helpful assistant."),
		)
}

#[derive(Debug)]
pub struct Serve {
	config_path: Option<String>,
	role_name: String,
	prompt: String,
}

impl Serve {
	pub fn parse_cli_args(mut matches: ArgMatches) -> anyhow::Result<Self> {
		Ok(Serve {
			config_path: matches.try_remove_one::<String>("config").unwrap_or_default(),
			role_name: matches.try_remove_one::<String>("role").unwrap_or_default().unwrap_or_else(|| "assistant".to_string()),
			prompt: matches
				.try_remove_one::<String>("prompt")
				.unwrap_or_default()
				.unwrap_or_else(|| "You are a helpful assistant.".to_string()),
		})
	}

	pub async fn execute(self) -> anyhow::Result<()> {
		let runtimes_config = RuntimesConfig::default();
		initialize_runtimes(runtimes_config)?;

		let config = match &self.config_path {
			Some(path) => RuntimeConfig::load_from_file(path)?,
			None => RuntimeConfig::default(),
		};
		info!(runtime_dir = %config.runtime_dir, "starting agent runtime");

		let runtime = AgentRuntime::new(config, Arc::new(LoopbackReasoningService))?;
		runtime.register_observer(Arc::new(StdoutObserver));
		runtime.start().await?;

		let role = runtime.create_role(self.role_name, self.prompt, Vec::new(), None);
		let agent = runtime.spawn(&role.id, AgentId::root(), None)?;
		info!(agent_id = %agent.id, "spawned agent, type a message and press enter (ctrl-d to quit)");

		let stdin = BufReader::new(tokio::io::stdin());
		let mut lines = stdin.lines();
		loop {
			tokio::select! {
				line = lines.next_line() => {
					match line? {
						Some(text) if !text.trim().is_empty() => {
							if let Err(err) = runtime.submit_to_agent(agent.id.clone(), text, None) {
								warn!(error = %err, "failed to submit message");
							}
						},
						Some(_) => continue,
						None => break,
					}
				},
				_ = tokio::signal::ctrl_c() => {
					info!("received ctrl-c, shutting down");
					break;
				},
			}
		}

		let report = runtime.shutdown().await;
		info!(?report, "agent runtime stopped");
		Ok(())
	}
}

/// Prints every envelope addressed back to the operator's terminal session.
struct StdoutObserver;

impl ObserverPort for StdoutObserver {
	fn on_envelope(&self, env: &Envelope) {
		if !env.to.is_user() {
			return;
		}
		match env.payload.as_text() {
			Some(text) => println!("{}: {}", env.from, text),
			None => println!("{}: {:?}", env.from, env.payload),
		}
	}
}
