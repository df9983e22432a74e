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

//! Envelopes, identifiers, the message bus, cancellation registry,
//! conversation store with auto-compression, and the reasoning/tool
//! interfaces — components C1 through C7 of the agent runtime core.
//!
//! The turn engine, lifecycle manager, and runtime facade (C8–C10) that
//! compose these into a running system live in `agent-runtime`.

pub mod agent;
pub mod bus;
pub mod cancellation;
pub mod compression;
pub mod conversation;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod ports;
pub mod reasoning;
pub mod role;
pub mod tools;

pub use agent::{Agent, AgentStatus, ComputeStatus};
pub use bus::{AwaitOutcome, Bus};
pub use cancellation::{CancellationRegistry, CancellationToken};
pub use compression::{maybe_compress, CompressionConfig};
pub use conversation::{estimate_tokens, ConversationRecord, ConversationStore, Role as ConversationRole};
pub use envelope::{Attachment, AttachmentType, Envelope, EnvelopeDraft, EnvelopeKind, Payload, Priority};
pub use error::{CoreError, CoreErrorKind, ErrorPayload};
pub use ids::{AgentId, MessageId, RoleId, TaskId};
pub use ports::{NullObserver, NullPersistence, ObserverPort, PersistencePort};
pub use reasoning::{ChatOutcome, ChatRequest, ChatResponse, ReasoningError, ReasoningErrorKind, ReasoningService, Usage};
pub use role::Role;
pub use tools::{EmptyToolRegistry, ToolDef, ToolError, ToolExecutionContext, ToolRegistry};
