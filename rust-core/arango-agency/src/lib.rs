// SPDX-License-Identifier: PMPL-1.0-or-later
//! # arango-agency
//!
//! Client for the agency, the consensus-backed key/value store a cluster
//! keeps its plan and current state in.
//!
//! - Reads follow leader redirects, bounded and cycle-checked.
//! - Writes are atomic [`Transaction`]s whose outcome is decided by the
//!   returned `results` array.
//! - [`are_agents_healthy`] probes every agent concurrently and checks that
//!   they agree on exactly one leader.
//! - [`compat`] accepts transactions and conditions in the older API shape.
//!
//! ## Example
//!
//! ```rust
//! use arango_agency::{Key, KeyChanger, Transaction, Condition};
//! use arango_agency::memory::InMemoryCluster;
//!
//! # tokio_test::block_on(async {
//! let cluster = InMemoryCluster::with_agents("http://agent-1:8531", &[]);
//! let agency = cluster.agency(["http://agent-1:8531"]).unwrap();
//!
//! let key = Key::arango(["Plan", "Version"]);
//! let tx = Transaction::default()
//!     .with_key(KeyChanger::set(key.clone(), 1))
//!     .with_condition(key.clone(), Condition::old_empty(true));
//! agency.write_transaction(&tx).await.unwrap();
//!
//! let version: u64 = agency.read_key(key).await.unwrap();
//! assert_eq!(version, 1);
//! # });
//! ```

pub mod client;
pub mod compat;
pub mod config;
pub mod error;
pub mod health;
pub mod key;
pub mod memory;
pub mod read;
pub mod transaction;
pub mod write;

#[cfg(test)]
mod testutil;

pub use client::{Agency, READ_PATH, TRANSIENT_PATH, WRITE_PATH};
pub use compat::{from_legacy, LegacyAgency, LegacyTransaction, TransactionInput, WriteCondition};
pub use config::AgencyConfig;
pub use error::{is_key_not_found, is_precondition_failed, AgencyError, Result};
pub use health::{
    are_agents_healthy, is_same_endpoint, probe_agents, AgentStatus, HealthCheckOptions,
    HealthReport,
};
pub use key::{Key, ARANGO_ROOT};
pub use memory::{AgentRole, InMemoryCluster};
pub use transaction::{
    new_client_id, Condition, KeyChanger, Operation, Transaction, TransactionOptions,
};
