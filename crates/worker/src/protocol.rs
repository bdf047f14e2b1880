//! Messages exchanged with the tree worker
//!
//! Requests look like `{"id": 2, "action": "open", "data": "src/a.js"}`.
//! Replies echo the request id with either `result` or `error`; unsolicited
//! progress updates use id `0`.

use sd_core::FormattedNode;
use serde::{Deserialize, Serialize};

/// Id reserved for progress messages
pub const PROGRESS_ID: u64 = 0;

/// Load input that defers to the `load_url` filter option
pub const FROM_URL_INPUT: &str = "from-url://";

/// Request sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub action: Action,
}

/// What the worker should do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "lowercase")]
pub enum Action {
    /// Build a new tree; debounced
    Load(LoadRequest),
    /// Format one node of the last completed tree
    Open(String),
}

/// Payload of a load request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    /// Data location handed to the source; `None` reuses its default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Unparsed filter query string
    #[serde(default)]
    pub options: String,
}

/// Snapshot of a tree being built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeProgress {
    /// Root formatted one level deep
    pub root: FormattedNode,
    /// Completion estimate; exactly 1 once the load finished
    pub percent: f64,
    /// Whether the data describes the difference between two builds
    #[serde(rename = "diffMode")]
    pub diff_mode: bool,
    /// Set when the load failed; `root` then holds the partial tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Successful reply payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyResult {
    /// Final state of a load
    Tree(TreeProgress),
    /// Opened node, `None` when the path is unknown
    Node(Option<FormattedNode>),
}

/// Body of a worker message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageBody {
    Progress(TreeProgress),
    Done { result: ReplyResult },
    Failed { error: String },
}

/// Message sent by the worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerMessage {
    pub id: u64,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl WorkerMessage {
    pub fn progress(progress: TreeProgress) -> Self {
        Self {
            id: PROGRESS_ID,
            body: MessageBody::Progress(progress),
        }
    }

    pub fn reply(id: u64, result: ReplyResult) -> Self {
        Self {
            id,
            body: MessageBody::Done { result },
        }
    }

    pub fn error(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            body: MessageBody::Failed {
                error: error.into(),
            },
        }
    }

    /// Check whether this is an unsolicited progress update
    pub fn is_progress(&self) -> bool {
        self.id == PROGRESS_ID
    }
}
