//! Catalyst Center REST transport.
//!
//! This crate speaks the controller's HTTP API on behalf of the reconciliation
//! engine. It hides authentication, TLS, routing and retries behind the
//! [`Transport`] trait:
//!
//! - `invoke(family, operation, params, mutates)` issues one API operation
//!   and returns the decoded body plus the task id of asynchronous mutations
//! - `task_status(task_id)` fetches a single task snapshot
//! - `version()` reports the controller release
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Engine         │────▶│   Transport      │
//! │   (reconcilers)  │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                 ┌─────────────────┴────────────────┐
//!                 ▼                                  ▼
//!        ┌──────────────────┐              ┌──────────────────┐
//!        │  HttpTransport   │              │  MockTransport   │
//!        │  token + retry   │              │  (test-utils)    │
//!        └────────┬─────────┘              └──────────────────┘
//!                 │ HTTPS (route table)
//!        ┌────────▼─────────┐
//!        │  Catalyst Center │
//!        └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use catalyst_core::Record;
//! use catalyst_transport::{HttpTransport, Transport, TransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransportConfig::new("dnac.example.com", "admin", "secret");
//! let transport = HttpTransport::new(config)?;
//!
//! let version = transport.version().await?;
//! println!("Controller release: {version}");
//!
//! let params = Record::new().with("nameHierarchy", "Global/USA");
//! let sites = transport
//!     .invoke("site_design", "get_sites", &params, false)
//!     .await?;
//! println!("{}", sites.response);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod http;
pub mod routes;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use config::{RetryConfig, TransportConfig};
pub use error::{Result, TransportError};
pub use http::HttpTransport;
pub use routes::{Method, Route};
pub use types::{Invocation, TaskStatus};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockTransport, RecordedCall};

use async_trait::async_trait;
use catalyst_core::{ControllerVersion, Record};

/// The interface the reconciliation engine consumes.
///
/// Implementations own the HTTP client and the auth token; callers never see
/// either. Transient failures are retried inside the implementation and only
/// surface once retries are exhausted.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke one controller operation.
    ///
    /// `mutates` marks calls that change controller state; implementations use
    /// it for logging and to avoid resending a write that timed out, and mocks
    /// use it to separate reads from writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation is unknown, a required path
    /// parameter is missing, or the request fails after all retries.
    async fn invoke(
        &self,
        family: &str,
        operation: &str,
        params: &Record,
        mutates: bool,
    ) -> Result<Invocation>;

    /// Fetch the current status of an asynchronous task.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retries.
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus>;

    /// Report the controller release.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the version cannot be parsed.
    async fn version(&self) -> Result<ControllerVersion>;
}
