//! # warden-engine
//!
//! Resource/filter/action policy evaluation.
//!
//! ## Architecture
//!
//! ```text
//!  PolicyDefinition
//!        │
//!        ▼
//! ┌──────────────────┐    resolve type, build + validate
//! │  PolicyRunner    │ ─────────────────────────────────▶ Registry
//! │  1. Enumerate    │ ──▶ CloudClient::enumerate
//! │  2. Filter       │ ──▶ FilterPipeline (narrowing only)
//! │  3. Act          │ ──▶ ActionExecutor ──▶ CloudClient::invoke
//! │  4. Report       │ ──▶ RunReport + AuditSink
//! └──────────────────┘
//! ```
//!
//! Configuration problems (unknown keys, schema violations, a multi-mode
//! action with no mode) are caught while loading, before any remote call.
//! Remote and data problems are isolated to the resource that caused them and
//! recorded in the report.
//!
//! The [`Registry`] is populated once at startup by resource modules and is
//! only read afterwards.

pub mod actions;
pub mod audit;
pub mod client;
pub mod error;
pub mod executor;
pub mod filters;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod runner;

pub use actions::{Action, ActionContext};
pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use client::replay::{RecordedResponse, ReplayClient, ReplayFixture};
pub use client::{ClientError, ClientResponse, CloudClient, Invocation};
pub use error::{ConfigurationError, DataError, EngineError, RemoteCallError};
pub use executor::ActionExecutor;
pub use filters::{Filter, FilterContext};
pub use pipeline::FilterPipeline;
pub use registry::{ActionFactory, FilterFactory, FilterLoader, Registry};
pub use report::{Diagnostic, Diagnostics, Outcome, RunReport, RunState};
pub use runner::{LoadedPolicy, PolicyRunner};
