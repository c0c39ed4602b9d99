//! Task classification for accelerator admission

use serde::{Deserialize, Serialize};

/// The kinds of inference work that compete for accelerator time.
///
/// Task types exist only to look up an admission policy; the arbiter itself
/// never interprets them beyond logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Speech recognition
    Asr,
    /// Machine translation
    Nmt,
    /// Speech synthesis
    Tts,
    /// Transcript repair
    SemanticRepair,
    /// Anything that doesn't fit the named stages
    Other,
}

impl TaskType {
    /// All known task types, in descending default priority order.
    pub const ALL: [TaskType; 5] = [
        TaskType::Asr,
        TaskType::Nmt,
        TaskType::Tts,
        TaskType::SemanticRepair,
        TaskType::Other,
    ];

    /// Stable snake_case name, matching the configuration key.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Asr => "asr",
            TaskType::Nmt => "nmt",
            TaskType::Tts => "tts",
            TaskType::SemanticRepair => "semantic_repair",
            TaskType::Other => "other",
        }
    }

    /// Parse a configuration key. Returns `None` for unknown keys so config
    /// merging can skip them instead of failing.
    pub fn from_key(key: &str) -> Option<TaskType> {
        match key {
            "asr" => Some(TaskType::Asr),
            "nmt" => Some(TaskType::Nmt),
            "tts" => Some(TaskType::Tts),
            "semantic_repair" => Some(TaskType::SemanticRepair),
            "other" => Some(TaskType::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
