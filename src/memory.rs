// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Memory-pressure abstraction, per DESIGN NOTES §9: the teacher calls the
// runtime GC and reads heap counters directly; here that is behind a trait
// so the adaptive batch-size logic in the batch processor never touches a
// managed heap directly.

/// Fraction of available memory currently in use, in `[0.0, 1.0]`.
pub trait MemoryProbe: Send + Sync {
    fn used_fraction(&self) -> f64;

    fn free_fraction(&self) -> f64 {
        (1.0 - self.used_fraction()).max(0.0)
    }
}

/// Host-memory probe backed by `sysinfo`, refreshed on every call. Coarser
/// than a managed-heap probe but the right default for a Rust host process
/// with no GC to prod.
pub struct SysinfoMemoryProbe {
    system: parking_lot::Mutex<sysinfo::System>,
}

impl SysinfoMemoryProbe {
    pub fn new() -> Self {
        use sysinfo::SystemExt;
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        SysinfoMemoryProbe {
            system: parking_lot::Mutex::new(system),
        }
    }
}

impl Default for SysinfoMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoMemoryProbe {
    fn used_fraction(&self) -> f64 {
        use sysinfo::SystemExt;
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        system.used_memory() as f64 / total as f64
    }
}

/// Always reports zero pressure. The default for environments (or tests)
/// that have no managed heap worth tracking.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPressureProbe;

impl MemoryProbe for NoPressureProbe {
    fn used_fraction(&self) -> f64 {
        0.0
    }
}

/// A probe whose reading is set directly. Used throughout the batch
/// processor tests to exercise the 0.85/0.70 thresholds deterministically.
pub struct FixedMemoryProbe {
    fraction: std::sync::atomic::AtomicU64,
}

impl FixedMemoryProbe {
    pub fn new(used_fraction: f64) -> Self {
        FixedMemoryProbe {
            fraction: std::sync::atomic::AtomicU64::new(used_fraction.to_bits()),
        }
    }

    pub fn set(&self, used_fraction: f64) {
        self.fraction
            .store(used_fraction.to_bits(), std::sync::atomic::Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn used_fraction(&self) -> f64 {
        f64::from_bits(self.fraction.load(std::sync::atomic::Ordering::Relaxed))
    }
}
