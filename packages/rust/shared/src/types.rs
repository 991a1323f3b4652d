//! Core domain types for conversational-thread graphs.

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ConversationId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for conversation identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Generate a new time-sortable conversation identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Kind of graph node, serialized with the wire names the frontend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    ConversationalThread,
    Bookmark,
}

/// One topic segment or bookmark in the conversation graph.
///
/// Identity is by `node_name`: the extractor refers to an existing node by
/// repeating the same name, and the merge layer never renames or deduplicates.
/// `chunk_id` and `linked_nodes` are stamped by the orchestrator, never by
/// the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique display identifier within a session; acts as the primary key.
    pub node_name: String,

    /// `conversational_thread` or `bookmark`.
    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Name of the temporally previous node, if any.
    pub predecessor: Option<String>,

    /// Name of the temporally next node, if any.
    pub successor: Option<String>,

    /// Related node name → free-text explanation of the thematic/causal
    /// connection (not merely temporal adjacency). Ordered map so serialized
    /// output is deterministic.
    #[serde(default)]
    pub contextual_relation: BTreeMap<String, String>,

    /// Node names derived from `contextual_relation` keys; input for
    /// downstream graph traversal. Populated on merge.
    #[serde(default)]
    pub linked_nodes: Vec<String>,

    /// Identifier of the chunk that produced or last updated this node.
    /// Assigned by the merge step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,

    /// Bookmarks are created once on a "create" trigger phrase and mutated
    /// in place on every "open" trigger — never duplicated.
    #[serde(default)]
    pub is_bookmark: bool,

    /// Flags nodes carrying potential structured insight for the downstream
    /// causal-loop generator.
    #[serde(default)]
    pub is_contextual_progress: bool,

    /// Fact-checkable assertion strings attached to this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<String>>,

    /// What was discussed in this node.
    #[serde(default)]
    pub summary: String,
}

impl Node {
    /// Minimal constructor used by tests and fakes.
    pub fn thread(name: impl Into<String>) -> Self {
        Self {
            node_name: name.into(),
            kind: NodeKind::ConversationalThread,
            predecessor: None,
            successor: None,
            contextual_relation: BTreeMap::new(),
            linked_nodes: Vec::new(),
            chunk_id: None,
            is_bookmark: false,
            is_contextual_progress: false,
            claims: None,
            summary: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// An immutable unit of input text submitted to the extractor.
///
/// Created once by the chunker or the live accumulator; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque identifier; consumers must not infer order from it.
    pub id: String,
    /// The raw text of this chunk.
    pub text: String,
    /// Chronological position, tracked separately from the opaque id.
    pub ordinal: usize,
}

impl Chunk {
    /// Create a chunk with a fresh opaque id.
    pub fn new(text: impl Into<String>, ordinal: usize) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            text: text.into(),
            ordinal,
        }
    }
}

/// An ordered collection of chunks. The `Vec` carries chronology; the
/// dictionary view is for consumers that look text up by id.
#[derive(Debug, Clone, Default)]
pub struct ChunkSet {
    pub chunks: Vec<Chunk>,
}

impl ChunkSet {
    /// Id → text view of the chunk set.
    pub fn chunk_dict(&self) -> HashMap<String, String> {
        self.chunks
            .iter()
            .map(|c| (c.id.clone(), c.text.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Persisted artifact
// ---------------------------------------------------------------------------

/// The JSON blob persisted for a finished conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationArtifact {
    pub file_name: String,
    pub conversation_id: ConversationId,
    /// Chunk id → raw text.
    pub chunks: HashMap<String, String>,
    /// Graph snapshots, one list of nodes per processed chunk.
    pub graph_data: Vec<Vec<Node>>,
}

impl ConversationArtifact {
    /// Total node count across all snapshots' final state.
    pub fn node_count(&self) -> usize {
        self.graph_data.last().map(|g| g.len()).unwrap_or(0)
    }
}

/// Metadata row indexing a persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub id: String,
    pub file_name: String,
    pub no_of_nodes: usize,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}
