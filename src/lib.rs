// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
//! Multi-shard query fan-out and consolidation engine for a
//! traffic-violation reporting platform whose data is partitioned across N
//! independent relational shards (one per province).
//!
//! A logical query executes against every selected shard, streams rows
//! back, optionally consolidates across shards, and is delivered to a
//! byte-sink [`shard::Consumer`] — either synchronously or as a background
//! [`task::TaskManager`] task the caller polls.
//!
//! The hard core: [`rewriter::Rewriter`] (query rewriting),
//! [`analyzer::QueryAnalyzer`] (consolidation classification),
//! [`batch::BatchProcessor`] (cross-shard execution), and
//! [`task::TaskManager`] (task lifecycle). The relational driver, the HTTP
//! surface, output-format serialization, authentication, and catalog CRUD
//! transport stay outside this crate; they are reached only through the
//! [`shard::ShardExecutor`], [`shard::Consumer`], [`clock::Clock`], and
//! [`memory::MemoryProbe`] traits.

pub mod analyzer;
pub mod batch;
pub mod binder;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod filter;
pub mod memory;
pub mod metrics;
pub mod pagination;
pub mod rewriter;
pub mod shard;
pub mod sql_scan;
pub mod task;

pub use analyzer::{AnalysisVerdict, FieldType, QueryAnalyzer};
pub use binder::{ParameterBag, ParameterBinder};
pub use catalog::{QueryCatalog, QueryTemplate};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use filter::Filter;
pub use pagination::{PaginationStrategy, PaginationStrategyAnalyzer};
pub use rewriter::Rewriter;
pub use shard::{Consumer, Row, Shard, ShardExecutor, ShardOutcome};
pub use task::TaskManager;
