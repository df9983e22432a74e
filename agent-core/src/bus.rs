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

//! The message bus (C2): per-agent FIFO inboxes with priority and
//! scheduled-delivery semantics, plus fan-out to global observers.
//!
//! Each recipient's inbox is literally one `actors::channel_with_priority`
//! pair, matching §4.2's two-band priority + FIFO ordering exactly. The bus
//! itself is a plain `Arc`-backed struct rather than an `actors::Actor`: an
//! actor serializes every `Handler::handle` call through one mailbox, and
//! `awaitNext` is a long-lived suspension per recipient — wrapping the bus
//! in a single actor would make one agent's blocking wait starve every other
//! agent's `send`. A plain struct owning one channel pair per `AgentId`
//! gives every recipient an independent wait/notify path, which is what
//! §5's "per-recipient mutex plus a condition variable or equivalent"
//! describes in the first place.

use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex},
};

use actors::{
	channel_with_priority::{channel, QueueCapacity, Receiver, Sender},
	SchedulerClient,
};
use tracing::warn;

use crate::{
	cancellation::CancellationToken,
	envelope::{Envelope, EnvelopeDraft},
	error::{CoreError, CoreErrorKind},
	ids::AgentId,
	ports::ObserverPort,
};

struct Inbox {
	sender: Sender<Envelope>,
	// Wrapped in an `Arc` so `await_next` can clone the receiver handle out
	// from under the inboxes mutex and await it without holding that (non-
	// `Send`-across-await) guard.
	receiver: Arc<Receiver<Envelope>>,
}

/// What `awaitNext` resolved to.
pub enum AwaitOutcome {
	Delivered(Envelope),
	Cancelled,
}

struct BusInner {
	inboxes: Mutex<HashMap<AgentId, Inbox>>,
	observers: Mutex<Vec<Arc<dyn ObserverPort>>>,
	scheduler: SchedulerClient,
}

/// Cloneable handle onto the shared bus state.
#[derive(Clone)]
pub struct Bus {
	inner: Arc<BusInner>,
}

impl Bus {
	pub fn new(scheduler: SchedulerClient) -> Self {
		let mut inboxes = HashMap::new();
		inboxes.insert(AgentId::user(), Self::new_inbox());
		Bus {
			inner: Arc::new(BusInner {
				inboxes: Mutex::new(inboxes),
				observers: Mutex::new(Vec::new()),
				scheduler,
			}),
		}
	}

	fn new_inbox() -> Inbox {
		let (sender, receiver) = channel(QueueCapacity::Unbounded);
		Inbox { sender, receiver: Arc::new(receiver) }
	}

	/// Called by C9 when an agent is spawned or restored.
	pub fn register_recipient(&self, agent_id: AgentId) {
		self.inner.inboxes.lock().unwrap().entry(agent_id).or_insert_with(Self::new_inbox);
	}

	/// Called by C9 on termination: drops the inbox entirely.
	pub fn unregister_recipient(&self, agent_id: &AgentId) {
		self.inner.inboxes.lock().unwrap().remove(agent_id);
	}

	pub fn register_observer(&self, observer: Arc<dyn ObserverPort>) {
		self.inner.observers.lock().unwrap().push(observer);
	}

	fn notify_observers(&self, env: &Envelope) {
		for observer in self.inner.observers.lock().unwrap().iter() {
			observer.on_envelope(env);
		}
	}

	fn has_recipient(&self, agent_id: &AgentId) -> bool {
		self.inner.inboxes.lock().unwrap().contains_key(agent_id)
	}

	fn enqueue_now(&self, env: Envelope) {
		let inboxes = self.inner.inboxes.lock().unwrap();
		let Some(inbox) = inboxes.get(&env.to) else {
			warn!(to = %env.to, "dropping envelope for recipient that disappeared before delivery");
			return;
		};
		let result = match env.priority {
			crate::envelope::Priority::High => inbox.sender.send_high_priority(env),
			crate::envelope::Priority::Normal => {
				// try_send never blocks while holding the inboxes lock; the
				// low-priority channel is unbounded by default for agent
				// inboxes so this never actually fills.
				inbox.sender.try_send_low_priority(env).map_err(|_| {
					actors::channel_with_priority::SendError
				})
			},
		};
		if result.is_err() {
			warn!("failed to enqueue envelope: recipient channel disconnected");
		}
	}

	/// `send(env)` from §4.2. Validates `to`, stamps identifiers, handles
	/// scheduled delivery, and always notifies observers before (not after)
	/// any scheduling — per §8 S5, observer fan-out happens at `send` time.
	pub fn send(&self, draft: EnvelopeDraft) -> Result<Envelope, CoreError> {
		if !self.has_recipient(&draft.to) && !draft.to.is_user() {
			return Err(CoreError::new(CoreErrorKind::UnknownRecipient));
		}
		let env = draft.into_envelope();
		self.notify_observers(&env);
		match env.scheduled_delivery_at {
			Some(at) if at > chrono::Utc::now() => {
				let delay = (at - chrono::Utc::now())
					.to_std()
					.unwrap_or(std::time::Duration::ZERO);
				let bus = self.clone();
				let scheduled_env = env.clone();
				self.inner.scheduler.schedule_event(
					move || bus.enqueue_now(scheduled_env),
					delay,
				);
			},
			_ => self.enqueue_now(env.clone()),
		}
		Ok(env)
	}

	/// `receiveNext(agentId)` from §4.2: non-blocking peek-and-pop.
	pub fn receive_next(&self, agent_id: &AgentId) -> Option<Envelope> {
		let inboxes = self.inner.inboxes.lock().unwrap();
		let inbox = inboxes.get(agent_id)?;
		inbox.receiver.try_recv().ok()
	}

	/// `awaitNext(agentId, cancellationToken)` from §4.2: suspends until an
	/// envelope is available or the token is cancelled. The channel receive
	/// itself wakes immediately on delivery; cancellation has no async
	/// notification of its own (§4.3 is a plain counter), so it is polled on
	/// a short interval raced against the receive.
	pub async fn await_next(&self, agent_id: &AgentId, token: &CancellationToken) -> AwaitOutcome {
		let receiver = {
			let inboxes = self.inner.inboxes.lock().unwrap();
			match inboxes.get(agent_id) {
				Some(inbox) => inbox.receiver.clone(),
				None => return AwaitOutcome::Cancelled,
			}
		};
		if token.is_cancelled() {
			return AwaitOutcome::Cancelled;
		}
		let mut cancellation_poll = tokio::time::interval(std::time::Duration::from_millis(10));
		cancellation_poll.tick().await;
		loop {
			tokio::select! {
				result = receiver.recv() => {
					return match result {
						Ok(env) => AwaitOutcome::Delivered(env),
						Err(_) => AwaitOutcome::Cancelled,
					};
				},
				_ = cancellation_poll.tick() => {
					if token.is_cancelled() {
						return AwaitOutcome::Cancelled;
					}
				},
			}
		}
	}

	/// `clearQueue(agentId)` from §4.2: drops all undelivered envelopes,
	/// returning the discarded set for diagnostics.
	pub fn clear_queue(&self, agent_id: &AgentId) -> Vec<Envelope> {
		let inboxes = self.inner.inboxes.lock().unwrap();
		let Some(inbox) = inboxes.get(agent_id) else { return Vec::new() };
		let mut drained = inbox.receiver.drain_high_priority();
		drained.extend(inbox.receiver.drain_low_priority());
		drained
	}

	pub fn queue_depth(&self, agent_id: &AgentId) -> usize {
		let inboxes = self.inner.inboxes.lock().unwrap();
		inboxes.get(agent_id).map(|inbox| inbox.receiver.len()).unwrap_or(0)
	}

	pub fn known_recipients(&self) -> HashSet<AgentId> {
		self.inner.inboxes.lock().unwrap().keys().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::envelope::{EnvelopeKind, Payload, Priority};

	fn test_scheduler() -> SchedulerClient {
		actors::start_scheduler()
	}

	#[tokio::test]
	async fn test_unknown_recipient_rejected() {
		let bus = Bus::new(test_scheduler());
		let draft = EnvelopeDraft::new(
			AgentId::user(),
			AgentId::new(),
			EnvelopeKind::Text,
			Payload::text("hi"),
		);
		let result = bus.send(draft);
		assert!(matches!(result, Err(e) if matches!(e.kind(), CoreErrorKind::UnknownRecipient)));
	}

	#[tokio::test]
	async fn test_send_to_user_always_allowed() {
		let bus = Bus::new(test_scheduler());
		let draft = EnvelopeDraft::new(
			AgentId::root(),
			AgentId::user(),
			EnvelopeKind::Text,
			Payload::text("hi"),
		);
		assert!(bus.send(draft).is_ok());
		assert!(bus.receive_next(&AgentId::user()).is_some());
	}

	#[tokio::test]
	async fn test_high_priority_precedes_normal() {
		let bus = Bus::new(test_scheduler());
		let agent_id = AgentId::new();
		bus.register_recipient(agent_id.clone());
		let normal = EnvelopeDraft::new(
			AgentId::user(),
			agent_id.clone(),
			EnvelopeKind::Text,
			Payload::text("normal"),
		);
		let high = EnvelopeDraft::new(
			AgentId::user(),
			agent_id.clone(),
			EnvelopeKind::Text,
			Payload::text("high"),
		)
		.with_priority(Priority::High);
		bus.send(normal).unwrap();
		bus.send(high).unwrap();
		let first = bus.receive_next(&agent_id).unwrap();
		assert_eq!(first.payload.as_text(), Some("high"));
		let second = bus.receive_next(&agent_id).unwrap();
		assert_eq!(second.payload.as_text(), Some("normal"));
	}

	#[tokio::test]
	async fn test_clear_queue_returns_discarded_set() {
		let bus = Bus::new(test_scheduler());
		let agent_id = AgentId::new();
		bus.register_recipient(agent_id.clone());
		for i in 0..3 {
			let draft = EnvelopeDraft::new(
				AgentId::user(),
				agent_id.clone(),
				EnvelopeKind::Text,
				Payload::text(format!("m{i}")),
			);
			bus.send(draft).unwrap();
		}
		assert_eq!(bus.queue_depth(&agent_id), 3);
		let discarded = bus.clear_queue(&agent_id);
		assert_eq!(discarded.len(), 3);
		assert_eq!(bus.queue_depth(&agent_id), 0);
	}

	/// §8 S5: a future `scheduledDeliveryAt` holds the envelope out of the
	/// inbox until release, but the observer still fires at `send` time.
	#[tokio::test]
	async fn test_scheduled_delivery_releases_after_delay() {
		use crate::ports::ObserverPort;
		use std::sync::atomic::{AtomicUsize, Ordering};

		struct CountingObserver(Arc<AtomicUsize>);
		impl ObserverPort for CountingObserver {
			fn on_envelope(&self, _env: &Envelope) {
				self.0.fetch_add(1, Ordering::SeqCst);
			}
		}

		let bus = Bus::new(test_scheduler());
		let agent_id = AgentId::new();
		bus.register_recipient(agent_id.clone());
		let observed = Arc::new(AtomicUsize::new(0));
		bus.register_observer(Arc::new(CountingObserver(observed.clone())));

		let release_at = chrono::Utc::now() + chrono::Duration::milliseconds(50);
		let draft = EnvelopeDraft::new(AgentId::user(), agent_id.clone(), EnvelopeKind::Text, Payload::text("later"))
			.with_scheduled_delivery(release_at);
		bus.send(draft).unwrap();

		// Observer fan-out happens on `send`, before scheduling — not at delivery time.
		assert_eq!(observed.load(Ordering::SeqCst), 1);
		assert!(bus.receive_next(&agent_id).is_none());

		tokio::time::sleep(std::time::Duration::from_millis(120)).await;
		let delivered = bus.receive_next(&agent_id).expect("envelope should have been released");
		assert_eq!(delivered.payload.as_text(), Some("later"));
		assert_eq!(observed.load(Ordering::SeqCst), 1);
	}

	/// §8 boundary: a scheduled release time already in the past enters the
	/// inbox immediately rather than being handed to the delay timer.
	#[tokio::test]
	async fn test_scheduled_delivery_in_the_past_enters_immediately() {
		let bus = Bus::new(test_scheduler());
		let agent_id = AgentId::new();
		bus.register_recipient(agent_id.clone());

		let release_at = chrono::Utc::now() - chrono::Duration::seconds(5);
		let draft = EnvelopeDraft::new(AgentId::user(), agent_id.clone(), EnvelopeKind::Text, Payload::text("now"))
			.with_scheduled_delivery(release_at);
		bus.send(draft).unwrap();

		let delivered = bus.receive_next(&agent_id).expect("past-scheduled envelope should be immediate");
		assert_eq!(delivered.payload.as_text(), Some("now"));
	}
}
