use serde::{Deserialize, Serialize};

/// Body of a task queue message; one per accepted source url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub source_url: String,
    pub task_id: String,
}
