//! Folding freshly extracted nodes into the running graph.

use tracing::debug;

use threadline_shared::{Chunk, Node};

/// Stamp provenance onto `new_nodes` and append them to `graph`.
///
/// Each incoming node gets the chunk's id as `chunk_id` and a `linked_nodes`
/// list rebuilt from its `contextual_relation` keys. Existing nodes are never
/// mutated or deduplicated; the graph only grows.
pub fn merge_nodes(graph: &mut Vec<Node>, mut new_nodes: Vec<Node>, chunk: &Chunk) -> usize {
    let added = new_nodes.len();
    for node in &mut new_nodes {
        node.chunk_id = Some(chunk.id.clone());
        node.linked_nodes = node.contextual_relation.keys().cloned().collect();
    }
    graph.append(&mut new_nodes);
    debug!(chunk = chunk.ordinal, added, total = graph.len(), "merged nodes");
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_shared::Chunk;

    #[test]
    fn merge_stamps_chunk_id_and_links() {
        let chunk = Chunk::new("hello world", 0);
        let mut graph = Vec::new();

        let mut node = Node::thread("pricing discussion");
        node.contextual_relation
            .insert("intro".into(), "follows the opening small talk".into());
        node.contextual_relation
            .insert("budget".into(), "refines the budget thread".into());

        let added = merge_nodes(&mut graph, vec![node], &chunk);
        assert_eq!(added, 1);
        assert_eq!(graph[0].chunk_id.as_deref(), Some(chunk.id.as_str()));
        // BTreeMap keys come out sorted.
        assert_eq!(graph[0].linked_nodes, vec!["budget", "intro"]);
    }

    #[test]
    fn merge_appends_without_touching_existing_nodes() {
        let first = Chunk::new("a", 0);
        let second = Chunk::new("b", 1);
        let mut graph = Vec::new();

        merge_nodes(
            &mut graph,
            vec![Node::thread("alpha"), Node::thread("beta")],
            &first,
        );
        let alpha_chunk = graph[0].chunk_id.clone();

        merge_nodes(
            &mut graph,
            vec![Node::thread("gamma"), Node::thread("delta")],
            &second,
        );

        assert_eq!(graph.len(), 4);
        // Earlier provenance survives later merges.
        assert_eq!(graph[0].chunk_id, alpha_chunk);
        assert_eq!(graph[2].chunk_id.as_deref(), Some(second.id.as_str()));
        assert_eq!(
            graph.iter().map(|n| n.node_name.as_str()).collect::<Vec<_>>(),
            vec!["alpha", "beta", "gamma", "delta"]
        );
    }

    #[test]
    fn merge_with_no_relations_leaves_links_empty() {
        let chunk = Chunk::new("x", 0);
        let mut graph = Vec::new();
        merge_nodes(&mut graph, vec![Node::thread("lone")], &chunk);
        assert!(graph[0].linked_nodes.is_empty());
    }
}
