// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Phase B — Strategy selection, per spec §4.4.

use crate::config::EngineConfig;

use super::estimate::EstimationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    Parallel,
    Hybrid,
    Sequential,
}

/// Chooses the processing mode from the Phase A estimate, per §4.4:
/// `SEQUENTIAL` takes priority when any shard is large enough on its own to
/// warrant one-at-a-time handling, otherwise `PARALLEL` when both averages
/// are small, else `HYBRID`.
pub fn choose_mode(config: &EngineConfig, estimate: EstimationResult) -> ProcessingMode {
    if estimate.max_per_shard > config.sequential_max_threshold {
        return ProcessingMode::Sequential;
    }
    if estimate.avg_per_shard < config.parallel_avg_threshold && estimate.total < config.parallel_total_threshold {
        return ProcessingMode::Parallel;
    }
    ProcessingMode::Hybrid
}
