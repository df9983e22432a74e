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

//! An observer that emits a `tracing` event per envelope (§6). Useful on its
//! own for operational visibility, and as the base every richer observer
//! (persistence, UI fan-out) wraps, since it never fails and therefore never
//! risks violating `send`'s best-effort fan-out guarantee.

use agent_core::{Envelope, ObserverPort};
use tracing::info;

#[derive(Default)]
pub struct TracingObserver;

impl ObserverPort for TracingObserver {
	fn on_envelope(&self, env: &Envelope) {
		info!(
			envelope_id = %env.id,
			from = %env.from,
			to = %env.to,
			kind = ?env.kind,
			priority = ?env.priority,
			"envelope observed"
		);
	}
}

/// Fans an envelope out to several observers, any of which may fail without
/// affecting the others — `send`'s "observer failures never block or fail
/// the send call" (§4.2) extended to a composite observer.
pub struct BroadcastObserver {
	observers: Vec<std::sync::Arc<dyn ObserverPort>>,
}

impl BroadcastObserver {
	pub fn new(observers: Vec<std::sync::Arc<dyn ObserverPort>>) -> Self {
		BroadcastObserver { observers }
	}
}

impl ObserverPort for BroadcastObserver {
	fn on_envelope(&self, env: &Envelope) {
		for observer in &self.observers {
			observer.on_envelope(env);
		}
	}
}
