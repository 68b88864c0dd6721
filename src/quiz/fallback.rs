//! Deterministic stored question pool used when the AI source is absent or
//! failing.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::quiz::models::{Difficulty, Question, QuestionOrigin};

struct PoolEntry {
    text: &'static str,
    options: &'static [&'static str],
    correct: &'static str,
    difficulty: Difficulty,
}

const POOL: &[PoolEntry] = &[
    PoolEntry {
        text: "What does CI stand for in a build pipeline?",
        options: &[
            "Continuous Integration",
            "Code Inspection",
            "Container Isolation",
            "Critical Infrastructure",
        ],
        correct: "Continuous Integration",
        difficulty: Difficulty::Basic,
    },
    PoolEntry {
        text: "Which command shows the commit history of a Git repository?",
        options: &["git log", "git status", "git diff", "git blame"],
        correct: "git log",
        difficulty: Difficulty::Basic,
    },
    PoolEntry {
        text: "Which HTTP status code signals 'service unavailable'?",
        options: &["503", "404", "418", "301"],
        correct: "503",
        difficulty: Difficulty::Basic,
    },
    PoolEntry {
        text: "In Kubernetes, which object keeps a set of identical pods running?",
        options: &["Deployment", "ConfigMap", "Ingress", "Namespace"],
        correct: "Deployment",
        difficulty: Difficulty::Intermediate,
    },
    PoolEntry {
        text: "What is the default port for HTTPS traffic?",
        options: &["443", "80", "8080", "22"],
        correct: "443",
        difficulty: Difficulty::Basic,
    },
    PoolEntry {
        text: "Which tool declaratively manages infrastructure through providers and state files?",
        options: &["Terraform", "Ansible", "Jenkins", "Prometheus"],
        correct: "Terraform",
        difficulty: Difficulty::Intermediate,
    },
    PoolEntry {
        text: "In a blue-green deployment, what does switching traffic between environments avoid?",
        options: &["Downtime", "Code review", "Unit testing", "Monitoring"],
        correct: "Downtime",
        difficulty: Difficulty::Intermediate,
    },
    PoolEntry {
        text: "Which consistency property do Redis pub/sub channels guarantee to a single subscriber?",
        options: &[
            "In-order delivery per channel",
            "Exactly-once delivery",
            "Durable replay",
            "Global ordering across channels",
        ],
        correct: "In-order delivery per channel",
        difficulty: Difficulty::Advanced,
    },
    PoolEntry {
        text: "What problem do idempotency keys solve in retried API requests?",
        options: &[
            "Duplicate side effects",
            "Slow responses",
            "Schema drift",
            "Cache invalidation",
        ],
        correct: "Duplicate side effects",
        difficulty: Difficulty::Advanced,
    },
    PoolEntry {
        text: "Which CAP property does a system give up when it keeps serving during a network partition?",
        options: &["Consistency", "Availability", "Partition tolerance", "Durability"],
        correct: "Consistency",
        difficulty: Difficulty::Advanced,
    },
];

/// Cycles through the stored pool deterministically, preferring entries that
/// match the requested difficulty.
pub struct FallbackPool {
    cursor: AtomicUsize,
}

impl Default for FallbackPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackPool {
    /// Create a pool positioned at its first entry.
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next question for the requested difficulty.
    ///
    /// Cycles through the entries matching the requested difficulty; when
    /// none exist the whole pool is cycled instead, so the pool never fails.
    pub fn next(&self, difficulty: Difficulty) -> Question {
        let tick = self.cursor.fetch_add(1, Ordering::Relaxed);
        let matching: Vec<usize> = POOL
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.difficulty == difficulty)
            .map(|(index, _)| index)
            .collect();
        let entry = if matching.is_empty() {
            &POOL[tick % POOL.len()]
        } else {
            &POOL[matching[tick % matching.len()]]
        };

        Question {
            text: entry.text.to_string(),
            options: entry.options.iter().map(|s| s.to_string()).collect(),
            correct_answer: entry.correct.to_string(),
            difficulty: entry.difficulty,
            origin: QuestionOrigin::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_prefers_requested_difficulty() {
        let pool = FallbackPool::new();
        for _ in 0..POOL.len() {
            let q = pool.next(Difficulty::Advanced);
            assert_eq!(q.difficulty, Difficulty::Advanced);
            assert_eq!(q.origin, QuestionOrigin::Fallback);
        }
    }

    #[test]
    fn pool_cycles_without_repeating_consecutively() {
        let pool = FallbackPool::new();
        let first = pool.next(Difficulty::Basic);
        let second = pool.next(Difficulty::Basic);
        assert_ne!(first.text, second.text);
    }

    #[test]
    fn every_entry_contains_its_correct_answer() {
        for entry in POOL {
            assert!(entry.options.contains(&entry.correct));
        }
    }
}
