use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// Generates `{prefix}_{counter:06}_{random8}` ids. The counter is per prefix
/// and guarded by a mutex, so concurrent callers never share a number.
#[derive(Debug, Default)]
pub struct TraceIdGenerator {
    counters: Mutex<HashMap<String, u64>>,
}

impl TraceIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&self, prefix: &str) -> String {
        let prefix = if prefix.trim().is_empty() {
            "trace"
        } else {
            prefix.trim()
        };
        let counter = {
            let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            let counter = counters.entry(prefix.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        let uuid = Uuid::new_v4().simple().to_string();
        format!("{}_{:06}_{}", prefix, counter, &uuid[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn trace_id_format() {
        let ids = TraceIdGenerator::new();
        let id = ids.generate("task_01");
        let re = Regex::new(r"^task_01_000001_[a-f0-9]{8}$").unwrap();
        assert!(re.is_match(&id), "Generated ID: {}", id);
        assert!(ids.generate("task_01").starts_with("task_01_000002_"));
        assert!(ids.generate("other").starts_with("other_000001_"));
        assert!(ids.generate("  ").starts_with("trace_000001_"));
    }

    #[test]
    fn trace_ids_are_unique_across_many_calls() {
        let ids = TraceIdGenerator::new();
        let mut seen = HashSet::new();
        for _ in 0..100_000 {
            let id = ids.generate("agent");
            assert!(seen.insert(id.clone()), "Duplicate ID: {}", id);
        }
    }

    #[test]
    fn concurrent_callers_get_distinct_counters() {
        let ids = Arc::new(TraceIdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..500).map(|_| ids.generate("tool")).collect::<Vec<_>>())
            })
            .collect();

        let mut counters = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                let counter = id.split('_').nth(1).unwrap().to_string();
                assert!(counters.insert(counter), "counter reused: {id}");
            }
        }
        assert_eq!(counters.len(), 4000);
    }
}
