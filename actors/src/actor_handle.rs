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
	atomic::{AtomicBool, Ordering},
	Mutex,
};

use common::ProgressState;
use tokio::sync::watch;
use tracing::debug;

use crate::{
	command::{Command, Observe},
	observation::{Observation, ObservationType},
	registry::ActorJoinHandle,
	Actor, ActorContext, ActorExitStatus, ActorState, MessageBus, OBSERVE_TIMEOUT,
};

/// Outcome of a supervisor's liveness check on an [`ActorHandle`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Health {
	/// The actor is running and has shown activity since the last check.
	Healthy,
	/// The actor panicked, returned an error, or stopped making progress.
	FailureOrUnhealthy,
	/// The actor exited with `ActorExitStatus::Success`.
	Success,
}

/// A type-erased view over an actor handle's liveness, for code that
/// supervises actors without naming their concrete type.
pub trait Supervisable: Send + Sync {
	fn check_health(&self, accept_initializing: bool) -> Health;
	fn name(&self) -> &str;
}

/// A type-erased way to poll an actor's [`Health`] from outside the crate
/// (e.g. an HTTP health-check endpoint wrapping a registry of handles).
pub trait Healthz: Send + Sync {
	fn healthz(&self) -> Health;
}

/// A handle to a spawned actor.
///
/// It gives access to the actor's last known state, lets the holder wait for
/// its completion, and exposes the liveness-check primitives the
/// [`crate::supervisor::Supervisor`] relies on.
pub struct ActorHandle<A: Actor> {
	state_rx: watch::Receiver<A::ObservableState>,
	join_handle: ActorJoinHandle,
	ctx: ActorContext<A>,
	last_progress: Mutex<ProgressState>,
	progressed_once: AtomicBool,
}

impl<A: Actor> ActorHandle<A> {
	pub(crate) fn new(
		state_rx: watch::Receiver<A::ObservableState>,
		join_handle: ActorJoinHandle,
		ctx: ActorContext<A>,
	) -> Self {
		let last_progress = Mutex::new(ctx.progress().snapshot());
		ActorHandle { state_rx, join_handle, ctx, last_progress, progressed_once: AtomicBool::new(false) }
	}

	/// Returns the last state broadcast by the actor, without round-tripping
	/// through its mailbox.
	pub fn last_observation(&self) -> A::ObservableState {
		self.state_rx.borrow().clone()
	}

	/// Asks the actor to snapshot its state and waits (up to
	/// [`OBSERVE_TIMEOUT`]) for the answer.
	pub async fn observe(&self) -> Observation<A::ObservableState> {
		let Ok(oneshot_rx) = self.ctx.messagebus().send_message_with_high_priority(Observe) else {
			return Observation { obs_type: ObservationType::PostMortem, state: self.last_observation() };
		};
		match tokio::time::timeout(OBSERVE_TIMEOUT, oneshot_rx).await {
			Ok(Ok(state)) => Observation { obs_type: ObservationType::Alive, state },
			_ => Observation { obs_type: ObservationType::Timeout, state: self.last_observation() },
		}
	}

	/// Like [`Self::observe`]: since `Observe` is queued FIFO with every other
	/// high priority message (including scheduled self-messages), the
	/// returned state reflects all work the actor had already queued at call
	/// time.
	pub async fn process_pending_and_observe(&self) -> Observation<A::ObservableState> {
		self.observe().await
	}

	/// Requests a state refresh without waiting for the answer. Coalesces
	/// with any `Observe` already in flight, so repeated calls (e.g. from a
	/// supervisor polling loop) do not pile up in the actor's queue.
	pub fn refresh_observe(&self) {
		if !self.ctx.set_observe_enqueued_and_return_previous() {
			let _ = self.ctx.messagebus().send_message_with_high_priority(Observe);
		}
	}

	pub fn state(&self) -> ActorState {
		self.ctx.state()
	}

	pub fn messagebus(&self) -> &MessageBus<A> {
		self.ctx.messagebus()
	}

	/// Activates the actor's kill switch and waits for it to exit.
	pub async fn kill(self) -> (ActorExitStatus, A::ObservableState) {
		self.ctx.terminate_sig().kill();
		self.join().await
	}

	/// Waits for the actor to exit, whatever the reason.
	pub async fn join(self) -> (ActorExitStatus, A::ObservableState) {
		let exit_status = self.join_handle.join().await;
		(exit_status, self.last_observation())
	}

	/// Asks the actor to gracefully quit and waits for it to exit.
	pub async fn quit(self) -> (ActorExitStatus, A::ObservableState) {
		let _ = self.ctx.messagebus().send_message_with_high_priority(Command::Quit);
		self.join().await
	}

	/// Checks whether the actor has shown activity since the previous call.
	///
	/// `accept_initializing` relaxes the check the very first time it is
	/// called for a given handle: a freshly spawned actor that has not yet
	/// had a chance to record any progress is not considered unhealthy.
	pub fn check_health(&self, accept_initializing: bool) -> Health {
		let actor_state = self.ctx.state();
		if actor_state.is_exit() {
			return if actor_state == ActorState::Success {
				Health::Success
			} else {
				Health::FailureOrUnhealthy
			};
		}
		let progress = self.ctx.progress();
		let mut last_progress = self.last_progress.lock().unwrap();
		let made_progress = progress.registered_activity_since_last_call(*last_progress);
		*last_progress = progress.snapshot();
		let never_progressed = !self.progressed_once.load(Ordering::Relaxed);
		if made_progress || (accept_initializing && never_progressed) {
			self.progressed_once.store(true, Ordering::Relaxed);
			Health::Healthy
		} else {
			debug!(actor = %self.ctx.actor_instance_id(), "actor-is-not-making-progress");
			Health::FailureOrUnhealthy
		}
	}
}

impl<A: Actor> Supervisable for ActorHandle<A> {
	fn check_health(&self, accept_initializing: bool) -> Health {
		ActorHandle::check_health(self, accept_initializing)
	}

	fn name(&self) -> &str {
		self.ctx.actor_instance_id()
	}
}

impl<A: Actor> Healthz for ActorHandle<A> {
	fn healthz(&self) -> Health {
		self.check_health(false)
	}
}
