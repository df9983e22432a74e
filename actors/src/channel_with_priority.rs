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

//! A bounded/unbounded MPSC channel with two priority bands.
//!
//! High priority messages (commands, scheduled self-messages) always win a race
//! against low priority messages. Within a band, delivery order is FIFO.

use std::fmt;

use thiserror::Error;

/// Capacity of the low priority channel. The high priority channel is always
/// unbounded: commands must never be refused because an actor's low priority
/// queue is full.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueCapacity {
	Bounded(usize),
	Unbounded,
}

impl QueueCapacity {
	fn build<T>(self) -> (flume::Sender<T>, flume::Receiver<T>) {
		match self {
			QueueCapacity::Bounded(cap) => flume::bounded(cap),
			QueueCapacity::Unbounded => flume::unbounded(),
		}
	}
}

#[derive(Error, Debug, Eq, PartialEq, Copy, Clone)]
#[error("the channel is disconnected")]
pub struct SendError;

fn flume_send_err<T>(_err: flume::SendError<T>) -> SendError {
	SendError
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum TrySendError<T> {
	#[error("the channel is full")]
	Full(T),
	#[error("the channel is disconnected")]
	Disconnected,
}

#[derive(Error, Debug, Eq, PartialEq, Copy, Clone)]
#[error("the channel is disconnected")]
pub struct RecvError;

pub struct Sender<T> {
	high_priority_tx: flume::Sender<T>,
	low_priority_tx: flume::Sender<T>,
}

impl<T> Clone for Sender<T> {
	fn clone(&self) -> Self {
		Sender {
			high_priority_tx: self.high_priority_tx.clone(),
			low_priority_tx: self.low_priority_tx.clone(),
		}
	}
}

impl<T> Sender<T> {
	pub fn is_disconnected(&self) -> bool {
		self.low_priority_tx.is_disconnected()
	}

	pub fn send_high_priority(&self, msg: T) -> Result<(), SendError> {
		self.high_priority_tx.send(msg).map_err(flume_send_err)
	}

	pub async fn send_low_priority(&self, msg: T) -> Result<(), SendError> {
		self.low_priority_tx.send_async(msg).await.map_err(flume_send_err)
	}

	pub fn try_send_low_priority(&self, msg: T) -> Result<(), TrySendError<T>> {
		self.low_priority_tx.try_send(msg).map_err(|err| match err {
			flume::TrySendError::Full(msg) => TrySendError::Full(msg),
			flume::TrySendError::Disconnected(_) => TrySendError::Disconnected,
		})
	}
}

pub struct Receiver<T> {
	high_priority_rx: flume::Receiver<T>,
	low_priority_rx: flume::Receiver<T>,
}

impl<T> Receiver<T> {
	pub fn is_empty(&self) -> bool {
		self.high_priority_rx.is_empty() && self.low_priority_rx.is_empty()
	}

	/// Receives the next message, giving strict priority to the high priority
	/// channel whenever one is available.
	pub async fn recv(&self) -> Result<T, RecvError> {
		if let Ok(msg) = self.high_priority_rx.try_recv() {
			return Ok(msg);
		}
		tokio::select! {
			biased;
			high = self.high_priority_rx.recv_async() => high.map_err(|_| RecvError),
			low = self.low_priority_rx.recv_async() => low.map_err(|_| RecvError),
		}
	}

	/// Receives only from the high priority channel. Used while an actor is
	/// paused: commands and scheduled messages still get through.
	pub async fn recv_high_priority(&self) -> T {
		self.high_priority_rx.recv_async().await.expect(
			"the high priority channel should never disconnect while the matching ActorContext \
             is alive",
		)
	}

	pub fn try_recv(&self) -> Result<T, RecvError> {
		if let Ok(msg) = self.high_priority_rx.try_recv() {
			return Ok(msg);
		}
		self.low_priority_rx.try_recv().map_err(|_| RecvError)
	}

	/// Drains and returns all messages currently sitting in the low priority
	/// channel. Test-only: draining does not observe in-flight sends.
	pub fn drain_low_priority(&self) -> Vec<T> {
		self.low_priority_rx.drain().collect()
	}

	/// Drains and returns all messages currently sitting in the high priority
	/// channel. Used by callers that need to discard a mailbox entirely
	/// (both bands), not just its regular traffic.
	pub fn drain_high_priority(&self) -> Vec<T> {
		self.high_priority_rx.drain().collect()
	}

	/// Number of messages currently queued across both bands.
	pub fn len(&self) -> usize {
		self.high_priority_rx.len() + self.low_priority_rx.len()
	}
}

impl<T> fmt::Debug for Sender<T> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Sender").finish()
	}
}

pub fn channel<T>(queue_capacity: QueueCapacity) -> (Sender<T>, Receiver<T>) {
	let (high_priority_tx, high_priority_rx) = flume::unbounded();
	let (low_priority_tx, low_priority_rx) = queue_capacity.build();
	let sender = Sender { high_priority_tx, low_priority_tx };
	let receiver = Receiver { high_priority_rx, low_priority_rx };
	(sender, receiver)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_high_priority_goes_first() {
		let (tx, rx) = channel::<u32>(QueueCapacity::Unbounded);
		tx.try_send_low_priority(1).unwrap();
		tx.send_high_priority(2).unwrap();
		tx.try_send_low_priority(3).unwrap();
		assert_eq!(rx.recv().await.unwrap(), 2);
		assert_eq!(rx.recv().await.unwrap(), 1);
		assert_eq!(rx.recv().await.unwrap(), 3);
	}

	#[tokio::test]
	async fn test_bounded_low_priority_full() {
		let (tx, _rx) = channel::<u32>(QueueCapacity::Bounded(1));
		tx.try_send_low_priority(1).unwrap();
		assert!(matches!(tx.try_send_low_priority(2), Err(TrySendError::Full(2))));
	}

	#[tokio::test]
	async fn test_disconnect_detected() {
		let (tx, rx) = channel::<u32>(QueueCapacity::Unbounded);
		drop(rx);
		assert!(tx.is_disconnected());
		assert!(matches!(tx.try_send_low_priority(1), Err(TrySendError::Disconnected)));
	}

	#[tokio::test]
	async fn test_recv_high_priority_only() {
		let (tx, rx) = channel::<u32>(QueueCapacity::Unbounded);
		tx.try_send_low_priority(1).unwrap();
		tx.send_high_priority(2).unwrap();
		assert_eq!(rx.recv_high_priority().await, 2);
		assert!(!rx.is_empty());
	}
}
