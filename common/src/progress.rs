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

use std::sync::{
	atomic::{AtomicU32, AtomicUsize, Ordering},
	Arc,
};

/// Tracks whether an actor is making progress, for supervisor heartbeat checks.
///
/// `record_progress` and `protect_zone` both advance the same counter. A supervisor
/// samples the counter every `HEARTBEAT`: if it has not moved and no zone is
/// protected, the actor is considered stuck.
#[derive(Clone, Default)]
pub struct Progress {
	inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
	value: AtomicU32,
	num_protected_zones: AtomicUsize,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct ProgressState(u32);

impl Progress {
	pub fn record_progress(&self) {
		self.inner.value.fetch_add(1, Ordering::Relaxed);
	}

	/// Returns a guard. As long as the guard is alive, the actor is considered
	/// to be making progress, regardless of whether `record_progress` is called.
	pub fn protect_zone(&self) -> ProtectedZoneGuard {
		self.inner.num_protected_zones.fetch_add(1, Ordering::Relaxed);
		ProtectedZoneGuard { progress: self.clone() }
	}

	fn state(&self) -> ProgressState {
		ProgressState(self.inner.value.load(Ordering::Relaxed))
	}

	fn num_protected_zones(&self) -> usize {
		self.inner.num_protected_zones.load(Ordering::Relaxed)
	}

	/// Called by the supervisor. Returns true if progress was observed since the
	/// previous call, or a protected zone was (and still is) active.
	pub fn registered_activity_since_last_call(&self, previous_state: ProgressState) -> bool {
		self.num_protected_zones() > 0 || self.state() != previous_state
	}

	pub fn snapshot(&self) -> ProgressState {
		self.state()
	}
}

pub struct ProtectedZoneGuard {
	progress: Progress,
}

impl Drop for ProtectedZoneGuard {
	fn drop(&mut self) {
		self.progress.inner.num_protected_zones.fetch_sub(1, Ordering::Relaxed);
		self.progress.record_progress();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_progress_detects_record_progress() {
		let progress = Progress::default();
		let state = progress.snapshot();
		assert!(!progress.registered_activity_since_last_call(state));
		progress.record_progress();
		assert!(progress.registered_activity_since_last_call(state));
	}

	#[test]
	fn test_progress_protected_zone_counts_as_activity() {
		let progress = Progress::default();
		let state = progress.snapshot();
		let _guard = progress.protect_zone();
		assert!(progress.registered_activity_since_last_call(state));
	}

	#[test]
	fn test_progress_zone_released_on_drop() {
		let progress = Progress::default();
		{
			let _guard = progress.protect_zone();
			assert_eq!(progress.num_protected_zones(), 1);
		}
		assert_eq!(progress.num_protected_zones(), 0);
	}
}
