/// Merge policy for an incrementally fetched cursor connection.
///
/// Pages can arrive out of request order, be re-delivered, or come from
/// narrower queries that omit pagination fields. The merge keeps every
/// known edge reachable and never lets a degenerate response freeze
/// forward pagination.

use crate::types::{ PageInfo, TransferEdge, TransfersConnection };
use std::collections::HashSet;

/// Merge `incoming` into `existing`. `after` is the cursor the request was
/// issued with; `None` means a first-page (refresh) fetch.
pub fn merge_connections(
    existing: Option<&TransfersConnection>,
    incoming: &TransfersConnection,
    after: Option<&str>,
) -> TransfersConnection {
    match existing {
        None => normalize(incoming),
        Some(existing) => {
            if after.is_none() {
                merge_first_page(existing, incoming)
            } else {
                merge_after_page(existing, incoming)
            }
        }
    }
}

fn normalize(incoming: &TransfersConnection) -> TransfersConnection {
    let mut seen = HashSet::new();
    let edges = dedup_edges(&incoming.edges, &mut seen);
    TransfersConnection {
        edges,
        page_info: Some(resolve_page_info(incoming.page_info.as_ref(), None)),
        total_count: incoming.total_count,
    }
}

/// Refresh merge: incoming rules the top of the list, already-loaded older
/// edges are kept behind it so a refresh never truncates history.
fn merge_first_page(
    existing: &TransfersConnection,
    incoming: &TransfersConnection,
) -> TransfersConnection {
    let mut seen = HashSet::new();
    let mut edges = dedup_edges(&incoming.edges, &mut seen);
    for edge in &existing.edges {
        if let Some(node) = &edge.node {
            if seen.insert(node.id.clone()) {
                edges.push(edge.clone());
            }
        }
    }

    TransfersConnection {
        edges,
        page_info: Some(resolve_page_info(
            incoming.page_info.as_ref(),
            existing.page_info.as_ref(),
        )),
        total_count: incoming.total_count.or(existing.total_count),
    }
}

/// Cursor merge: append-only behind the existing edges.
fn merge_after_page(
    existing: &TransfersConnection,
    incoming: &TransfersConnection,
) -> TransfersConnection {
    let mut seen: HashSet<String> = existing
        .edges
        .iter()
        .filter_map(|e| e.node.as_ref().map(|n| n.id.clone()))
        .collect();

    let mut edges = existing.edges.clone();
    edges.extend(dedup_edges(&incoming.edges, &mut seen));

    let page_info = match &incoming.page_info {
        Some(pi) if pi.is_usable() => {
            // Shallow overlay: usable incoming fields win, the rest stays.
            let base = existing.page_info.clone().unwrap_or_default();
            Some(PageInfo {
                has_next_page: pi.has_next_page.or(base.has_next_page),
                end_cursor: pi.end_cursor.clone().or(base.end_cursor),
            })
        }
        _ => existing.page_info.clone(),
    };

    TransfersConnection {
        edges,
        page_info,
        total_count: incoming.total_count.or(existing.total_count),
    }
}

fn dedup_edges(edges: &[TransferEdge], seen: &mut HashSet<String>) -> Vec<TransferEdge> {
    let mut out = Vec::with_capacity(edges.len());
    for edge in edges {
        if let Some(node) = &edge.node {
            if seen.insert(node.id.clone()) {
                out.push(edge.clone());
            }
        }
    }
    out
}

/// A count-only response omitting pageInfo must not freeze pagination:
/// fall back to the previously known state, then to closed.
fn resolve_page_info(incoming: Option<&PageInfo>, existing: Option<&PageInfo>) -> PageInfo {
    match incoming {
        Some(pi) if pi.is_usable() => pi.clone(),
        _ => match existing {
            Some(pi) => pi.clone(),
            None => PageInfo::closed(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transfer;

    fn edge(id: &str) -> TransferEdge {
        TransferEdge {
            node: Some(Transfer {
                id: id.to_string(),
                ..Default::default()
            }),
        }
    }

    fn conn(ids: &[&str], has_next: bool, cursor: Option<&str>, total: Option<u64>) -> TransfersConnection {
        TransfersConnection {
            edges: ids.iter().map(|i| edge(i)).collect(),
            page_info: Some(PageInfo {
                has_next_page: Some(has_next),
                end_cursor: cursor.map(String::from),
            }),
            total_count: total,
        }
    }

    fn ids(c: &TransfersConnection) -> Vec<String> {
        c.nodes().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn after_merge_appends_and_dedups() {
        let existing = conn(&["a", "b"], true, Some("c1"), Some(10));
        let incoming = conn(&["b", "c"], true, Some("c2"), Some(10));

        let merged = merge_connections(Some(&existing), &incoming, Some("c1"));
        assert_eq!(ids(&merged), vec!["a", "b", "c"]);
        assert_eq!(merged.page_info.unwrap().end_cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn merge_is_idempotent_under_redelivery() {
        let existing = conn(&["a", "b"], true, Some("c1"), Some(10));
        let incoming = conn(&["c", "d"], false, Some("c2"), Some(10));

        let once = merge_connections(Some(&existing), &incoming, Some("c1"));
        let twice = merge_connections(Some(&once), &incoming, Some("c1"));
        assert_eq!(ids(&once), ids(&twice));
        assert_eq!(ids(&twice), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn first_page_merge_keeps_loaded_history() {
        let existing = conn(&["a", "b", "c"], true, Some("c3"), Some(10));
        let incoming = conn(&["x", "a"], true, Some("c1"), Some(11));

        let merged = merge_connections(Some(&existing), &incoming, None);
        // Incoming rules the top, existing tail is preserved, every id once.
        assert_eq!(ids(&merged), vec!["x", "a", "b", "c"]);
        assert_eq!(merged.total_count, Some(11));
    }

    #[test]
    fn count_only_response_does_not_freeze_pagination() {
        let existing = conn(&["a"], true, Some("c1"), Some(10));
        let incoming = TransfersConnection {
            edges: vec![],
            page_info: None,
            total_count: Some(42),
        };

        let merged = merge_connections(Some(&existing), &incoming, None);
        let pi = merged.page_info.unwrap();
        assert_eq!(pi.has_next_page, Some(true));
        assert_eq!(pi.end_cursor.as_deref(), Some("c1"));
        assert_eq!(merged.total_count, Some(42));
    }

    #[test]
    fn missing_total_count_falls_back_to_existing() {
        let existing = conn(&["a"], true, Some("c1"), Some(10));
        let mut incoming = conn(&["b"], false, None, None);
        incoming.page_info = Some(PageInfo {
            has_next_page: Some(false),
            end_cursor: None,
        });

        let merged = merge_connections(Some(&existing), &incoming, Some("c1"));
        assert_eq!(merged.total_count, Some(10));
        assert_eq!(merged.page_info.unwrap().has_next_page, Some(false));
    }

    #[test]
    fn fresh_state_defaults_to_closed_page_info() {
        let incoming = TransfersConnection {
            edges: vec![edge("a")],
            page_info: None,
            total_count: None,
        };
        let merged = merge_connections(None, &incoming, None);
        let pi = merged.page_info.unwrap();
        assert_eq!(pi.has_next_page, Some(false));
        assert!(pi.end_cursor.is_none());
    }

    #[test]
    fn null_nodes_are_dropped() {
        let incoming = TransfersConnection {
            edges: vec![edge("a"), TransferEdge { node: None }, edge("b")],
            page_info: None,
            total_count: None,
        };
        let merged = merge_connections(None, &incoming, None);
        assert_eq!(ids(&merged), vec!["a", "b"]);
    }
}
