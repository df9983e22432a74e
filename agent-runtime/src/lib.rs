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

//! The turn engine, lifecycle manager, and runtime facade (C8–C10) that
//! compose `agent-core`'s C1–C7 components into a running system, plus the
//! file-based adapters (`config`, `persistence`, `observer`) that implement
//! its external ports.

pub mod config;
pub mod facade;
pub mod lifecycle;
pub mod observer;
pub mod persistence;
pub mod platform_tools;
pub mod turn_engine;

pub use config::{ReasoningCapabilities, ReasoningServiceDescriptor, RuntimeConfig};
pub use facade::{AgentInspection, AgentRuntime};
pub use lifecycle::{AbortReceipt, LifecycleManager, ShutdownReport, TerminationReceipt};
pub use observer::{BroadcastObserver, TracingObserver};
pub use persistence::{MessageLogObserver, NdjsonPersistence, OrgGraph};
pub use platform_tools::PlatformToolRegistry;
pub use turn_engine::TurnEngineActor;
