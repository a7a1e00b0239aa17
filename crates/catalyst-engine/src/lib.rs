//! Declarative reconciliation engine for Catalyst Center resources.
//!
//! The engine takes a task document describing desired controller state,
//! and converges the controller toward it:
//!
//! - **Validation**: every record is checked against its resource [`Schema`]
//!   before anything is sent to the controller
//! - **Acquisition**: the current record is found by id or natural key,
//!   walking paginated list operations
//! - **Diff**: field-pair tables decide whether an update is needed
//! - **Reconciliation**: per-resource [`Reconciler`]s issue the create,
//!   update, delete and side-band calls, waiting on controller tasks
//! - **Extraction**: the reverse direction, turning controller state into a
//!   replayable document
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────────┐
//! │ TaskDocument │──▶│    Engine    │──▶│      Registry      │
//! └──────────────┘   │   (phases)   │   │ kind → Reconciler  │
//!                    └──────┬───────┘   └─────────┬──────────┘
//!                           │                     │
//!                    ┌──────▼───────┐   ┌─────────▼──────────┐
//!                    │  Aggregator  │   │      Context       │
//!                    │  (outcomes)  │   │  transport, tasks  │
//!                    └──────────────┘   │   site directory   │
//!                                       └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use catalyst_engine::{Engine, EngineConfig, TaskDocument};
//! use catalyst_transport::{HttpTransport, TransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(TransportConfig::from_env())?;
//! let engine = Engine::new(Arc::new(transport), EngineConfig::from_env());
//!
//! let doc = TaskDocument::from_yaml(
//!     "config:\n  - fabric_site:\n      site_name_hierarchy: Global/USA/SJC\n",
//! )?;
//! let result = engine.run(&doc).await;
//! println!("{}", result.msg);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod acquire;
pub mod config;
pub mod context;
pub mod diff;
pub mod directory;
pub mod document;
pub mod engine;
pub mod error;
pub mod extract;
pub mod outcome;
pub mod reconciler;
pub mod resources;
pub mod reverse;
pub mod schema;
pub mod task;

pub use config::EngineConfig;
pub use context::Context;
pub use diff::{diff, Compare, DiffResult, FieldPair};
pub use document::{Entry, TaskDocument};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use extract::{ComponentStatus, ComponentSummary, ExtractRequest, Extractor};
pub use outcome::{AggregateResult, Aggregator, Diagnostic, Operation, Outcome};
pub use reconciler::{Change, Reconciler, Registry};
pub use schema::{FieldSpec, FieldType, Schema, Violation};
pub use task::{TaskHandle, TaskTracker};
