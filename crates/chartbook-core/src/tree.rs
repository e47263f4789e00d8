//! Tree shape analysis.
//!
//! Wide or deep charts need tighter nodes and larger level gaps to stay legible once they are
//! scaled onto a page. [`analyze_tree`] measures the shape of a chart and picks spacing from a
//! fixed rule table.

use crate::model::ChartNode;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutParams {
    pub node_width: f64,
    /// Gap between a parent's bottom edge and its children's level.
    pub children_margin: f64,
    /// Gap between siblings (and between rows of a compact block).
    pub compact_margin_between: f64,
    /// Gap between the two columns of a compact block, and between separate roots.
    pub compact_margin_pair: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            node_width: 250.0,
            children_margin: 100.0,
            compact_margin_between: 40.0,
            compact_margin_pair: 120.0,
        }
    }
}

impl LayoutParams {
    /// Applies the breadth table, then the depth and density overlays.
    pub fn for_shape(depth: usize, max_breadth: usize, total_nodes: usize) -> Self {
        let mut p = Self::default();

        if max_breadth > 10 {
            p.node_width = 200.0;
            p.compact_margin_between = 50.0;
            p.compact_margin_pair = 140.0;
            p.children_margin = 110.0;
        } else if max_breadth > 7 {
            p.node_width = 220.0;
            p.compact_margin_between = 45.0;
            p.compact_margin_pair = 130.0;
            p.children_margin = 105.0;
        } else if max_breadth > 4 {
            p.node_width = 235.0;
            p.compact_margin_between = 42.0;
            p.compact_margin_pair = 125.0;
        }

        // The depth overlay never shrinks what the breadth table chose.
        if depth > 6 {
            p.children_margin = p.children_margin.max(120.0);
        } else if depth > 4 {
            p.children_margin = p.children_margin.max(110.0);
        }

        let cells = (depth.max(1) * max_breadth.max(1)) as f64;
        let density = total_nodes as f64 / cells;
        if density > 1.5 {
            p.children_margin += 20.0;
            p.compact_margin_between += 15.0;
            p.compact_margin_pair += 20.0;
        }

        p
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeAnalysis {
    /// Number of BFS levels below the (synthetic) roots.
    pub depth: usize,
    pub max_breadth: usize,
    pub total_nodes: usize,
    pub layout_params: LayoutParams,
}

impl TreeAnalysis {
    fn empty() -> Self {
        Self {
            depth: 1,
            max_breadth: 1,
            total_nodes: 0,
            layout_params: LayoutParams::default(),
        }
    }
}

pub fn analyze_tree(nodes: &[ChartNode]) -> TreeAnalysis {
    analyze_links(nodes.iter().map(|n| (n.id.as_str(), n.parent_id.as_deref())))
}

/// Analyzes a flat `(id, parent_id)` list.
///
/// Nodes whose parent is missing, unknown, or themselves are roots. Nodes only reachable
/// through a parent cycle are promoted to roots in input order. Duplicate ids keep the first
/// occurrence.
pub fn analyze_links<'a, I>(links: I) -> TreeAnalysis
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut parents: Vec<Option<&str>> = Vec::new();
    for (id, parent) in links {
        if index.contains_key(id) {
            continue;
        }
        index.insert(id, parents.len());
        parents.push(parent);
    }

    let n = parents.len();
    if n == 0 {
        return TreeAnalysis::empty();
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent.and_then(|p| index.get(p).copied()) {
            Some(p) if p != i => children[p].push(i),
            _ => roots.push(i),
        }
    }

    let mut level: Vec<Option<usize>> = vec![None; n];
    let mut queue = VecDeque::new();
    for &r in &roots {
        level[r] = Some(0);
        queue.push_back(r);
    }
    bfs(&children, &mut level, &mut queue);

    for i in 0..n {
        if level[i].is_none() {
            level[i] = Some(0);
            queue.push_back(i);
            bfs(&children, &mut level, &mut queue);
        }
    }

    let mut per_level: Vec<usize> = Vec::new();
    for l in level.iter().flatten() {
        if per_level.len() <= *l {
            per_level.resize(l + 1, 0);
        }
        per_level[*l] += 1;
    }

    let depth = per_level.len().max(1);
    let max_breadth = per_level.iter().copied().max().unwrap_or(1).max(1);

    TreeAnalysis {
        depth,
        max_breadth,
        total_nodes: n,
        layout_params: LayoutParams::for_shape(depth, max_breadth, n),
    }
}

fn bfs(children: &[Vec<usize>], level: &mut [Option<usize>], queue: &mut VecDeque<usize>) {
    while let Some(i) = queue.pop_front() {
        let Some(l) = level[i] else { continue };
        for &c in &children[i] {
            if level[c].is_none() {
                level[c] = Some(l + 1);
                queue.push_back(c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: usize) -> Vec<ChartNode> {
        (0..len)
            .map(|i| {
                let parent = (i > 0).then(|| format!("n{}", i - 1));
                ChartNode::new(format!("n{i}"), parent.as_deref())
            })
            .collect()
    }

    #[test]
    fn empty_tree_uses_base_params() {
        let a = analyze_tree(&[]);
        assert_eq!(a.depth, 1);
        assert_eq!(a.max_breadth, 1);
        assert_eq!(a.total_nodes, 0);
        assert_eq!(a.layout_params, LayoutParams::default());
    }

    #[test]
    fn twelve_roots_use_widest_breadth_tier() {
        let nodes: Vec<_> = (0..12).map(|i| ChartNode::new(format!("n{i}"), None)).collect();
        let a = analyze_tree(&nodes);
        assert_eq!(a.depth, 1);
        assert_eq!(a.max_breadth, 12);
        assert_eq!(a.layout_params.node_width, 200.0);
        assert_eq!(a.layout_params.compact_margin_between, 50.0);
        assert_eq!(a.layout_params.compact_margin_pair, 140.0);
        assert_eq!(a.layout_params.children_margin, 110.0);
    }

    #[test]
    fn medium_breadth_keeps_base_children_margin() {
        let mut nodes = vec![ChartNode::new("root", None)];
        nodes.extend((0..5).map(|i| ChartNode::new(format!("c{i}"), Some("root"))));
        let a = analyze_tree(&nodes);
        assert_eq!(a.depth, 2);
        assert_eq!(a.max_breadth, 5);
        assert_eq!(a.layout_params.node_width, 235.0);
        assert_eq!(a.layout_params.children_margin, 100.0);
    }

    #[test]
    fn depth_overlay_only_raises_children_margin() {
        let a = analyze_tree(&chain(5));
        assert_eq!(a.depth, 5);
        assert_eq!(a.layout_params.children_margin, 110.0);

        let a = analyze_tree(&chain(7));
        assert_eq!(a.layout_params.children_margin, 120.0);

        // Wide tier already sits at 110; depth 5 must not lower it.
        let mut nodes = chain(5);
        nodes.extend((0..11).map(|i| ChartNode::new(format!("w{i}"), Some("n3"))));
        let a = analyze_tree(&nodes);
        assert_eq!(a.layout_params.children_margin, 110.0);
    }

    #[test]
    fn density_overlay_applies_above_threshold() {
        let p = LayoutParams::for_shape(1, 1, 2);
        assert_eq!(p.children_margin, 120.0);
        assert_eq!(p.compact_margin_between, 55.0);
        assert_eq!(p.compact_margin_pair, 140.0);
    }

    #[test]
    fn unknown_parent_is_a_root() {
        let nodes = vec![
            ChartNode::new("a", Some("missing")),
            ChartNode::new("b", Some("a")),
        ];
        let a = analyze_tree(&nodes);
        assert_eq!(a.depth, 2);
        assert_eq!(a.max_breadth, 1);
    }

    #[test]
    fn parent_cycle_is_broken_deterministically() {
        let nodes = vec![
            ChartNode::new("a", Some("b")),
            ChartNode::new("b", Some("a")),
            ChartNode::new("c", Some("b")),
        ];
        let a = analyze_tree(&nodes);
        assert_eq!(a.total_nodes, 3);
        // `a` is promoted to root: a -> b -> c.
        assert_eq!(a.depth, 3);
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let nodes = vec![
            ChartNode::new("a", None),
            ChartNode::new("a", Some("zzz")),
            ChartNode::new("b", Some("a")),
        ];
        let a = analyze_tree(&nodes);
        assert_eq!(a.total_nodes, 2);
        assert_eq!(a.depth, 2);
    }
}
