//! Core types shared by the Catalyst Center reconciliation crates.
//!
//! This crate provides the vocabulary every other crate speaks:
//!
//! - **Records**: [`Record`], an insertion-ordered JSON object used for both
//!   desired and current resource state
//! - **Resource kinds**: [`ResourceKind`] and the run-level [`State`]
//! - **Versions**: [`ControllerVersion`] for the per-resource version gate
//! - **Error kinds**: [`ErrorKind`], the stable classification surfaced to users
//!
//! # Example
//!
//! ```
//! use catalyst_core::{ControllerVersion, Record, ResourceKind};
//!
//! let version: ControllerVersion = "2.3.7.9".parse().unwrap();
//! assert!(version >= ResourceKind::Ssid.min_version());
//!
//! let mut record = Record::new();
//! record.set_path("ip_transit_settings.autonomous_system_number", "65001".into());
//! assert_eq!(
//!     record.get_str("ip_transit_settings.autonomous_system_number"),
//!     Some("65001")
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod kind;
pub mod record;
pub mod version;

pub use error::{CoreError, ErrorKind, Result};
pub use kind::{ResourceKind, State};
pub use record::Record;
pub use version::ControllerVersion;
