//! Accelerator arbiter configuration

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use babel_edge_core::TaskType;

/// What to do when the requested accelerator is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Queue behind the current holder, bounded by `max_wait_ms`
    Wait,
    /// Give up immediately; the caller skips the enhancement step
    Skip,
    /// Give up immediately and run the equivalent work on CPU
    FallbackCpu,
}

/// Admission policy for one task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPolicy {
    /// Ordinal priority; higher wins regardless of arrival order
    pub priority: i32,

    /// Maximum time a WAIT request stays queued (ms)
    pub max_wait_ms: u64,

    /// Degradation strategy while the accelerator is held
    pub busy_policy: BusyPolicy,
}

impl TaskPolicy {
    /// Queued-wait budget as a `Duration`.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Built-in policy for a task type, used when configuration has no entry.
pub fn builtin_policy(task: TaskType) -> TaskPolicy {
    match task {
        TaskType::Asr => TaskPolicy {
            priority: 90,
            max_wait_ms: 3000,
            busy_policy: BusyPolicy::Wait,
        },
        TaskType::Nmt => TaskPolicy {
            priority: 80,
            max_wait_ms: 3000,
            busy_policy: BusyPolicy::Wait,
        },
        TaskType::Tts => TaskPolicy {
            priority: 70,
            max_wait_ms: 2000,
            busy_policy: BusyPolicy::Wait,
        },
        TaskType::SemanticRepair => TaskPolicy {
            priority: 20,
            max_wait_ms: 400,
            busy_policy: BusyPolicy::Skip,
        },
        TaskType::Other => TaskPolicy {
            priority: 10,
            max_wait_ms: 1000,
            busy_policy: BusyPolicy::Skip,
        },
    }
}

/// Accelerator arbiter configuration.
///
/// `policies` is keyed by the snake_case task-type name. Entries for unknown
/// task types are ignored with a warning so a newer config file never crashes
/// an older node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Master switch; when false every acquire succeeds without queueing
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Accelerator keys this node schedules (opaque strings)
    #[serde(default = "default_gpu_keys")]
    pub gpu_keys: Vec<String>,

    /// Wait-queue capacity per accelerator key
    #[serde(default = "default_queue_limit")]
    pub default_queue_limit: usize,

    /// Maximum lease hold time before watchdog reclamation (ms)
    #[serde(default = "default_hold_max_ms")]
    pub default_hold_max_ms: u64,

    /// Watchdog sweep interval (ms)
    #[serde(default = "default_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,

    /// Per-task-type policy overrides
    #[serde(default)]
    pub policies: HashMap<String, TaskPolicy>,
}

fn default_true() -> bool {
    true
}
fn default_gpu_keys() -> Vec<String> {
    vec!["gpu:0".to_string()]
}
fn default_queue_limit() -> usize {
    8
}
fn default_hold_max_ms() -> u64 {
    30_000
}
fn default_watchdog_interval_ms() -> u64 {
    5_000
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gpu_keys: default_gpu_keys(),
            default_queue_limit: default_queue_limit(),
            default_hold_max_ms: default_hold_max_ms(),
            watchdog_interval_ms: default_watchdog_interval_ms(),
            policies: HashMap::new(),
        }
    }
}

impl ArbiterConfig {
    /// Resolve the admission policy for a task type, merging configuration
    /// over the built-in defaults.
    pub fn policy_for(&self, task: TaskType) -> TaskPolicy {
        self.policies
            .get(task.as_str())
            .copied()
            .unwrap_or_else(|| builtin_policy(task))
    }

    /// Maximum lease hold time as a `Duration`.
    pub fn default_hold_max(&self) -> Duration {
        Duration::from_millis(self.default_hold_max_ms)
    }

    /// Watchdog sweep interval as a `Duration`.
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    /// Policy keys that do not name a known task type.
    pub fn unknown_policy_keys(&self) -> Vec<&str> {
        self.policies
            .keys()
            .filter(|k| TaskType::from_key(k).is_none())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_priorities_are_ordered() {
        let priorities: Vec<i32> = TaskType::ALL
            .iter()
            .map(|t| builtin_policy(*t).priority)
            .collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_policy_for_falls_back_to_builtin() {
        let config = ArbiterConfig::default();
        assert_eq!(config.policy_for(TaskType::Asr), builtin_policy(TaskType::Asr));
    }

    #[test]
    fn test_policy_for_prefers_configured_entry() {
        let mut config = ArbiterConfig::default();
        config.policies.insert(
            "asr".to_string(),
            TaskPolicy {
                priority: 95,
                max_wait_ms: 1500,
                busy_policy: BusyPolicy::Wait,
            },
        );
        let policy = config.policy_for(TaskType::Asr);
        assert_eq!(policy.priority, 95);
        assert_eq!(policy.max_wait_ms, 1500);
        // Unrelated task types still use built-ins.
        assert_eq!(config.policy_for(TaskType::Nmt), builtin_policy(TaskType::Nmt));
    }

    #[test]
    fn test_unknown_policy_keys_are_reported_not_fatal() {
        let mut config = ArbiterConfig::default();
        config.policies.insert(
            "diarization".to_string(),
            TaskPolicy {
                priority: 50,
                max_wait_ms: 100,
                busy_policy: BusyPolicy::Skip,
            },
        );
        assert_eq!(config.unknown_policy_keys(), vec!["diarization"]);
        // Resolution for known types is unaffected.
        assert_eq!(config.policy_for(TaskType::Tts), builtin_policy(TaskType::Tts));
    }
}
