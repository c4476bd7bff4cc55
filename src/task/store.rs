// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Result artifact storage, per §4.6: "Results are stored as bytes keyed by
// task id; storage backend is out of scope." `ResultStore` is the seam;
// `InMemoryResultStore` is the default, runnable implementation.

use dashmap::DashMap;

pub trait ResultStore: Send + Sync {
    fn put(&self, task_id: &str, bytes: Vec<u8>);
    fn get(&self, task_id: &str) -> Option<Vec<u8>>;
    fn remove(&self, task_id: &str);
}

#[derive(Default)]
pub struct InMemoryResultStore {
    bytes: DashMap<String, Vec<u8>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        InMemoryResultStore::default()
    }
}

impl ResultStore for InMemoryResultStore {
    fn put(&self, task_id: &str, bytes: Vec<u8>) {
        self.bytes.insert(task_id.to_string(), bytes);
    }

    fn get(&self, task_id: &str) -> Option<Vec<u8>> {
        self.bytes.get(task_id).map(|v| v.clone())
    }

    fn remove(&self, task_id: &str) {
        self.bytes.remove(task_id);
    }
}
