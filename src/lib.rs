//! # GraphCore
//!
//! Property-graph storage and query-plan execution engine built on sparse
//! delta-overlay matrices, modeled on FalkorDB's storage layer.
//!
//! ## Architecture
//!
//! ```text
//! value              scalar/attribute model
//!   └─ entity        node/edge stores (free-list-reusing arenas)
//!       └─ matrix    delta-overlay sparse boolean/id matrices
//!           └─ graph facade, writer-preferring lock, registry
//!               ├─ operator   pull-based execution-plan pipeline
//!               ├─ index      batched resumable index population
//!               └─ serialize  versioned binary snapshot
//! ```
//!
//! `execution` and `config` are ambient stack shared across the above:
//! per-query timeout/cancellation/resource limits and result caching, and
//! hierarchical `figment`-based configuration.
//!
//! ## Example
//!
//! ```rust
//! use graphcore::graph::{Graph, GraphRegistry};
//! use graphcore::matrix::MatrixSyncPolicy;
//! use graphcore::value::AttributeSet;
//!
//! let registry = GraphRegistry::new();
//! let graph = registry.create_graph("social", MatrixSyncPolicy::default()).unwrap();
//!
//! let mut data = graph.acquire_write_lock();
//! let alice = data.create_node(vec![1], AttributeSet::new());
//! let bob = data.create_node(vec![1], AttributeSet::new());
//! data.create_edge(alice, bob, 2, AttributeSet::new()).unwrap();
//! data.apply_all_pending(false);
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod execution;
pub mod graph;
pub mod index;
pub mod matrix;
pub mod operator;
pub mod serialize;
pub mod value;

pub use config::Config;
pub use error::{GraphCoreError, GraphCoreResult};
pub use graph::{Graph, GraphError, GraphRegistry};
pub use matrix::{DeltaMatrix, MatrixSyncPolicy};
pub use value::{AttributeSet, Value};
