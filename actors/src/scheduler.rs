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

//! A clock actors can sleep and schedule events against.
//!
//! In production this is a thin wrapper around real wall-clock timers. In
//! tests, [`SchedulerClient::accelerate_time`] switches it to a virtual clock
//! that jumps straight to the next scheduled event as soon as nothing holds a
//! [`NoAdvanceTimeGuard`], so a test simulating hours of heartbeats runs in
//! milliseconds.

use std::{
	cmp::Reverse,
	collections::BinaryHeap,
	sync::{
		atomic::{AtomicBool, AtomicI64, Ordering},
		Arc,
	},
	time::Duration,
};

use tokio::sync::{mpsc, oneshot};

enum Action {
	Callback(Box<dyn FnOnce() + Send>),
	Wake(oneshot::Sender<()>),
}

struct ScheduledEvent {
	fire_at_micros: u128,
	seq: u64,
	action: Action,
}

impl PartialEq for ScheduledEvent {
	fn eq(&self, other: &Self) -> bool {
		self.fire_at_micros == other.fire_at_micros && self.seq == other.seq
	}
}
impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ScheduledEvent {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		(self.fire_at_micros, self.seq).cmp(&(other.fire_at_micros, other.seq))
	}
}

enum SchedulerCommand {
	Schedule { fire_in: Duration, action: Action },
}

/// A guard preventing the (accelerated, test-only) virtual clock from
/// fast-forwarding while it is alive.
///
/// Held across actor initialization/finalization and while a message is
/// in-flight, so that the scheduler never skips over a scheduled
/// self-message before the actor that would receive it is ready.
pub struct NoAdvanceTimeGuard {
	counter: Option<Arc<AtomicI64>>,
}

impl Drop for NoAdvanceTimeGuard {
	fn drop(&mut self) {
		if let Some(counter) = &self.counter {
			counter.fetch_sub(1, Ordering::SeqCst);
		}
	}
}

#[derive(Clone)]
pub struct SchedulerClient {
	inner: Arc<Inner>,
}

struct Inner {
	tx: mpsc::UnboundedSender<SchedulerCommand>,
	accelerated: AtomicBool,
	no_advance_time: Arc<AtomicI64>,
}

impl SchedulerClient {
	/// Schedules `callback` to run after `timeout` has elapsed. `callback`
	/// runs on the scheduler's own task, so it must be short: anything
	/// nontrivial should send a message rather than do work inline.
	pub fn schedule_event<F: FnOnce() + Send + 'static>(&self, callback: F, timeout: Duration) {
		if !self.inner.accelerated.load(Ordering::Relaxed) {
			tokio::spawn(async move {
				tokio::time::sleep(timeout).await;
				callback();
			});
			return;
		}
		let _ = self.inner.tx.send(SchedulerCommand::Schedule {
			fire_in: timeout,
			action: Action::Callback(Box::new(callback)),
		});
	}

	/// Drop-in replacement for `tokio::time::sleep` that can be accelerated.
	pub async fn sleep(&self, duration: Duration) {
		if duration.is_zero() {
			return;
		}
		if !self.inner.accelerated.load(Ordering::Relaxed) {
			tokio::time::sleep(duration).await;
			return;
		}
		let (tx, rx) = oneshot::channel();
		if self
			.inner
			.tx
			.send(SchedulerCommand::Schedule { fire_in: duration, action: Action::Wake(tx) })
			.is_err()
		{
			return;
		}
		let _ = rx.await;
	}

	/// Switches to the virtual clock. Test-only: once accelerated, time only
	/// advances when no [`NoAdvanceTimeGuard`] is held.
	pub fn accelerate_time(&self) {
		self.inner.accelerated.store(true, Ordering::Relaxed);
	}

	pub fn no_advance_time_guard(&self) -> NoAdvanceTimeGuard {
		self.inner.no_advance_time.fetch_add(1, Ordering::SeqCst);
		NoAdvanceTimeGuard { counter: Some(self.inner.no_advance_time.clone()) }
	}

	/// Temporarily lifts the fast-forward block, typically around a
	/// deliberate `ActorContext::sleep` call: unlike being blocked on an
	/// incoming message, a sleep is exactly the kind of wait the virtual
	/// clock is meant to skip past.
	pub fn dec_no_advance_time(&self) {
		self.inner.no_advance_time.fetch_sub(1, Ordering::SeqCst);
	}

	pub fn inc_no_advance_time(&self) {
		self.inner.no_advance_time.fetch_add(1, Ordering::SeqCst);
	}
}

struct SchedulerTask {
	rx: mpsc::UnboundedReceiver<SchedulerCommand>,
	no_advance_time: Arc<AtomicI64>,
	heap: BinaryHeap<Reverse<ScheduledEvent>>,
	virtual_now_micros: u128,
	next_seq: u64,
}

impl SchedulerTask {
	fn push(&mut self, fire_in: Duration, action: Action) {
		let fire_at_micros = self.virtual_now_micros + fire_in.as_micros();
		let seq = self.next_seq;
		self.next_seq += 1;
		self.heap.push(Reverse(ScheduledEvent { fire_at_micros, seq, action }));
	}

	fn fire_next(&mut self) {
		let Reverse(event) = self.heap.pop().expect("heap should be non-empty");
		self.virtual_now_micros = event.fire_at_micros;
		match event.action {
			Action::Callback(callback) => callback(),
			Action::Wake(tx) => {
				let _ = tx.send(());
			},
		}
	}

	async fn run(mut self) {
		loop {
			let can_advance = self.no_advance_time.load(Ordering::SeqCst) <= 0;
			if can_advance && !self.heap.is_empty() {
				// Drain any commands that arrived without blocking, then fire the
				// earliest event and give spawned tasks a chance to react (they may
				// register a new guard or schedule a follow-up event) before looping.
				while let Ok(command) = self.rx.try_recv() {
					self.apply(command);
				}
				self.fire_next();
				tokio::task::yield_now().await;
				continue;
			}
			match self.rx.recv().await {
				Some(command) => self.apply(command),
				None => return,
			}
		}
	}

	fn apply(&mut self, command: SchedulerCommand) {
		match command {
			SchedulerCommand::Schedule { fire_in, action } => self.push(fire_in, action),
		}
	}
}

/// Starts the background scheduler task and returns a cloneable handle to it.
pub fn start_scheduler() -> SchedulerClient {
	let (tx, rx) = mpsc::unbounded_channel();
	let no_advance_time = Arc::new(AtomicI64::new(0));
	let task = SchedulerTask {
		rx,
		no_advance_time: no_advance_time.clone(),
		heap: BinaryHeap::new(),
		virtual_now_micros: 0,
		next_seq: 0,
	};
	tokio::spawn(task.run());
	SchedulerClient {
		inner: Arc::new(Inner { tx, accelerated: AtomicBool::new(false), no_advance_time }),
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	use super::*;

	#[tokio::test]
	async fn test_sleep_real_time() {
		let scheduler = start_scheduler();
		let start = tokio::time::Instant::now();
		scheduler.sleep(Duration::from_millis(5)).await;
		assert!(start.elapsed() >= Duration::from_millis(5));
	}

	#[tokio::test(start_paused = true)]
	async fn test_accelerated_sleep_fires_in_order() {
		let scheduler = start_scheduler();
		scheduler.accelerate_time();
		let order = Arc::new(std::sync::Mutex::new(Vec::new()));
		let order_a = order.clone();
		let order_b = order.clone();
		scheduler.schedule_event(move || order_a.lock().unwrap().push("late"), Duration::from_secs(10));
		scheduler.schedule_event(move || order_b.lock().unwrap().push("early"), Duration::from_secs(1));
		scheduler.sleep(Duration::from_secs(20)).await;
		assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
	}

	#[tokio::test(start_paused = true)]
	async fn test_no_advance_time_guard_blocks_fast_forward() {
		let scheduler = start_scheduler();
		scheduler.accelerate_time();
		let fired = Arc::new(AtomicUsize::new(0));
		let fired_clone = fired.clone();
		scheduler.schedule_event(move || { fired_clone.fetch_add(1, Ordering::SeqCst); }, Duration::from_secs(1));
		let guard = scheduler.no_advance_time_guard();
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(fired.load(Ordering::SeqCst), 0);
		drop(guard);
		scheduler.sleep(Duration::from_secs(2)).await;
		assert_eq!(fired.load(Ordering::SeqCst), 1);
	}
}
