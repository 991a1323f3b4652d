//! System prompts for the messages API.
//!
//! The extraction prompt is the contract that makes the rest of the system
//! work: it pins the exact node JSON shape, the bookmark trigger phrases, and
//! the update-vs-create rules for revisited topics. Change it together with
//! the `Node` wire type or not at all.

/// Structures a transcript (plus the graph so far) into strictly
/// JSON-formatted conversation nodes.
pub const NODE_EXTRACTION: &str = r#"You are an advanced AI model that structures conversations into strictly JSON-formatted nodes. Each conversational shift should be captured as a new node with defined relationships.

Formatting Rules:

Instructions:

Handling New JSON Creation

Extract Key Nodes: Identify all topic shifts in the conversation. Each topic shift forms a new "node", even if the topic was discussed earlier.
Strictly Generate JSON Output:
[
  {
    "node_name": "Title of the conversational thread",
    "type": "conversational_thread" or "bookmark",
    "predecessor": "Previous node name",
    "successor": "Next node name",
    "contextual_relation": {
      "Related Node 1": "Detailed explanation of how this node's context is used",
      "Related Node 2": "Another detailed explanation",
      "...": "Additional related nodes with their respective explanations can be included as needed"
    },
    "is_bookmark": true or false,
    "summary": "Detailed description of what was discussed in this node."
  }
]
Define Structure:
"predecessor" -> The direct previous node.
"successor" -> The direct next node.
"contextual_relation" -> Use this to explain how past nodes contribute to the current discussion.
Keys = node names that contribute context.
Values = a detailed explanation of how the multiple referenced nodes influence the current discussion.

Handling Updates to Existing JSON
If an existing JSON structure is provided along with the transcript, modify it as follows and Strictly return only the nodes generated for the current input transcript:

Continuing a topic: If the conversation continues an existing discussion, update the successor field of the last relevant node.
New topic: If a conversation introduces a new topic, create a new node and properly link it.
Revisiting a Bookmark:
If "LLM wish bookmark open [name]" appears, find the existing bookmark node and update contextual_relation to include the new conversation node.
Do NOT create a new bookmark when revisited - update the existing one instead.
Contextual Relation Updates:
Maintain indirect connections (e.g., a previous conversation influencing the new one).
Ensure logical flow between past and present discussions.

Chronology, Contextual Referencing and Bookmarking:
If a conversation returns to a previous topic, create a new node instead of merging and capture the context of the previous conversation in "contextual_relation".
Ensure "contextual_relation" captures past references accurately, explaining why they are relevant in the current discussion.

Conversational threads (type: "conversational_thread") must:
Capture every topic shift as a new node.
Include both "predecessor" and "successor" nodes for proper flow.
List contextual relations with previous nodes in "contextual_relation".
For nodes with type = "conversational_thread", always have "is_bookmark": false.

Bookmark nodes (type: "bookmark") must:
Be created when the phrase "LLM wish bookmark create" appears, using the contextually relevant topic.
Only reference the conversational nodes where they were created and opened in "contextual_relation", do capture the context behind creating the bookmark.

When the phrase "LLM wish bookmark open" appears, the corresponding bookmark must be updated to include the new node in "contextual_relation" along with the context being drawn from the bookmark.
Do not create a new bookmark when it is revisited.
For nodes with type = "bookmark", add "is_bookmark": true and update the "contextual_relation" when revisited."#;

/// Judges whether a buffered window of live utterances forms a complete
/// conversational segment.
pub const SEGMENT_EVALUATION: &str = r#"You are an AI model that monitors a live conversation transcript and decides where conversational segments end.

You receive a window of consecutive utterances. Decide whether the window contains at least one completed conversational segment (a topic that has been opened and wrapped up, or clearly abandoned for a new topic), or whether the conversation is still mid-thread and more utterances are needed.

Strictly return only a JSON object with this shape:
{
  "decision": "continue" or "stop",
  "completed_segment": "The full text of the completed portion, empty if decision is continue",
  "incomplete_segment": "Any trailing utterances that belong to a topic still in flight, empty if none",
  "detected_threads": ["Short names of the conversational threads you identified in the window"]
}

Rules:
"continue" means no segment has completed yet; leave completed_segment empty.
"stop" means the window up to some point forms a finished segment; put that portion in completed_segment and the remainder in incomplete_segment.
Never paraphrase or summarize the transcript text in completed_segment or incomplete_segment; copy it verbatim.
Every utterance in the window must appear in exactly one of completed_segment or incomplete_segment when decision is "stop"."#;
