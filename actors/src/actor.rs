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

use std::fmt;

use async_trait::async_trait;
use common::RuntimeType;

use crate::{ActorContext, QueueCapacity};

/// The way an actor exited its processing loop.
///
/// Only `Success` and `Quit` are considered "clean" exits: they do not
/// activate the actor's kill switch, and therefore do not bring down
/// sibling actors sharing it.
#[derive(thiserror::Error, Debug)]
pub enum ActorExitStatus {
	/// The actor's messagebuses were all dropped and its mailbox drained.
	#[error("success")]
	Success,
	/// The actor received `Command::Quit`.
	#[error("quit")]
	Quit,
	/// The actor's kill switch was activated, either directly or because a
	/// sibling actor failed.
	#[error("killed")]
	Killed,
	/// The actor attempted to send a message to a downstream actor whose
	/// mailbox is gone.
	#[error("downstream-closed")]
	DownstreamClosed,
	/// The actor returned an error from one of its handlers.
	#[error("failure: {0}")]
	Failure(anyhow::Error),
	/// The actor panicked while processing a message or during finalization.
	#[error("panicked")]
	Panicked,
}

impl ActorExitStatus {
	pub fn is_success(&self) -> bool {
		matches!(self, ActorExitStatus::Success)
	}
}

impl From<anyhow::Error> for ActorExitStatus {
	fn from(err: anyhow::Error) -> Self {
		ActorExitStatus::Failure(err)
	}
}

/// The lifecycle hooks and metadata of a unit of concurrent work.
///
/// An actor owns its state exclusively: messages are the only way in, and
/// `ObservableState` snapshots are the only way out. Handlers for individual
/// message types are added via [`Handler`], not as part of this trait.
#[async_trait]
pub trait Actor: Send + 'static {
	/// A snapshot of the actor's state, broadcast on every `Observe` and
	/// picked up by the supervisor and by tests.
	type ObservableState: fmt::Debug + Clone + Send + Sync + 'static;

	/// A human readable name, used as a prefix of the actor's instance id and
	/// in logs. Defaults to the Rust type name.
	fn name(&self) -> String {
		std::any::type_name::<Self>().to_string()
	}

	/// Extracts a snapshot of the actor's state.
	fn observable_state(&self) -> Self::ObservableState;

	/// Capacity of the actor's low priority mailbox. Commands and scheduled
	/// self-messages are never subject to this limit.
	fn queue_capacity(&self) -> QueueCapacity {
		QueueCapacity::Unbounded
	}

	/// Whether the actor loop should yield to the runtime after each message.
	///
	/// Actors whose handlers never block the executor for long (the common
	/// case) should leave this at `true`. Actors that perform their own
	/// internal polling (e.g. via `ctx.sleep`) across many small steps may
	/// return `false` and call `ctx.record_progress()` instead, to avoid
	/// yielding thousands of times per heartbeat.
	fn yield_after_each_message(&self) -> bool {
		true
	}

	/// Called once before the actor starts processing messages.
	async fn initialize(&mut self, _ctx: &ActorContext<Self>) -> Result<(), ActorExitStatus>
	where
		Self: Sized,
	{
		Ok(())
	}

	/// Called after the mailbox has been fully drained, and before the actor
	/// goes back to waiting for the next message. Useful for batched work
	/// (e.g. flushing an accumulator) that should run once per wake-up rather
	/// than once per message.
	async fn on_drained_messages(&mut self, _ctx: &ActorContext<Self>) -> Result<(), ActorExitStatus>
	where
		Self: Sized,
	{
		Ok(())
	}

	/// Called exactly once, whatever the reason the actor stopped running.
	async fn finalize(
		&mut self,
		_exit_status: &ActorExitStatus,
		_ctx: &ActorContext<Self>,
	) -> anyhow::Result<()>
	where
		Self: Sized,
	{
		Ok(())
	}

	/// The tokio runtime the actor loop is spawned onto. Defaults to the
	/// shared non-blocking runtime; actors that perform blocking I/O in their
	/// handlers should override this to return a blocking runtime's handle.
	fn runtime_handle(&self) -> tokio::runtime::Handle {
		RuntimeType::NonBlocking.get_runtime_handle()
	}
}

/// Handles a single message type `M` for actor `A`.
///
/// An actor typically implements this trait once per message type it reacts
/// to; `#[async_trait]` lets the implementation be written as a plain `async
/// fn`.
#[async_trait]
pub trait Handler<M>: Actor {
	type Reply: Send + 'static;

	async fn handle(
		&mut self,
		message: M,
		ctx: &ActorContext<Self>,
	) -> Result<Self::Reply, ActorExitStatus>
	where
		Self: Sized;
}

/// Bridges [`Handler`] to the type-erased [`crate::envelope::Envelope`]
/// machinery used by the mailbox.
///
/// User code implements `Handler<M>`; this trait (and its blanket impl below)
/// is what the messagebus and envelope actually require, so that the reply
/// can be delivered through an arbitrary callback rather than only through a
/// return value.
#[async_trait]
pub trait DeferableReplyHandler<M>: Actor {
	type Reply: Send + 'static;

	async fn handle_message<F>(
		&mut self,
		message: M,
		response_callback: F,
		ctx: &ActorContext<Self>,
	) -> Result<(), ActorExitStatus>
	where
		Self: Sized,
		F: FnOnce(Self::Reply) + Send;
}

#[async_trait]
impl<A, M> DeferableReplyHandler<M> for A
where
	A: Handler<M>,
	M: Send + 'static,
{
	type Reply = <A as Handler<M>>::Reply;

	async fn handle_message<F>(
		&mut self,
		message: M,
		response_callback: F,
		ctx: &ActorContext<Self>,
	) -> Result<(), ActorExitStatus>
	where
		Self: Sized,
		F: FnOnce(Self::Reply) + Send,
	{
		let response = self.handle(message, ctx).await?;
		response_callback(response);
		Ok(())
	}
}
