//! Tidy tree layout for org charts.
//!
//! Layout runs in abstract `(breadth, depth)` coordinates: siblings spread along the breadth
//! axis and levels advance along the depth axis. The chart direction only decides how those
//! axes map to `x/y` at the end.

use chartbook_core::{ChartDocument, ChartNode, LayoutDirection, LayoutParams};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const HEADER_HEIGHT: f64 = 40.0;
const ROLE_ROW_HEIGHT: f64 = 22.0;
const PERSON_ROW_HEIGHT: f64 = 20.0;
const NODE_PADDING: f64 = 16.0;
const MIN_NODE_HEIGHT: f64 = 80.0;

/// Which nodes are expanded when a chart is laid out for export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpandPolicy {
    /// Ignore the editor's saved collapsed set so the export shows the whole tree.
    #[default]
    ExpandAll,
    RespectSaved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeBox {
    /// Index into `ChartDocument::nodes`.
    pub node: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub level: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutLink {
    /// Indices into `TreeLayout::nodes`.
    pub parent: usize,
    pub child: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeLayout {
    pub direction: LayoutDirection,
    pub nodes: Vec<NodeBox>,
    pub links: Vec<LayoutLink>,
    pub width: f64,
    pub height: f64,
}

pub fn node_height(node: &ChartNode) -> f64 {
    let roles = node
        .members
        .iter()
        .filter(|g| !g.role.trim().is_empty())
        .count() as f64;
    let people = node.person_count() as f64;
    let h = HEADER_HEIGHT + roles * ROLE_ROW_HEIGHT + people * PERSON_ROW_HEIGHT + NODE_PADDING;
    h.max(MIN_NODE_HEIGHT)
}

struct Forest {
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

/// Builds parent/child lists over the chart's nodes, hiding the children of collapsed nodes.
fn build_forest(chart: &ChartDocument, policy: ExpandPolicy) -> Forest {
    let nodes = &chart.nodes;
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    for (i, n) in nodes.iter().enumerate() {
        index.entry(n.id.as_str()).or_insert(i);
    }
    let collapsed: FxHashSet<&str> = chart
        .view_state
        .collapsed_nodes
        .iter()
        .map(String::as_str)
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (i, n) in nodes.iter().enumerate() {
        if index.get(n.id.as_str()) != Some(&i) {
            continue;
        }
        match n.parent_id.as_deref().and_then(|p| index.get(p).copied()) {
            Some(p) if p != i => children[p].push(i),
            _ => roots.push(i),
        }
    }

    // Nodes only reachable through a parent cycle become roots.
    let mut seen = vec![false; nodes.len()];
    let mut queue: VecDeque<usize> = roots.iter().copied().collect();
    for &r in &roots {
        seen[r] = true;
    }
    let mut i = 0;
    loop {
        while let Some(n) = queue.pop_front() {
            for &c in &children[n] {
                if !seen[c] {
                    seen[c] = true;
                    queue.push_back(c);
                }
            }
        }
        while i < nodes.len() && (seen[i] || index.get(nodes[i].id.as_str()) != Some(&i)) {
            i += 1;
        }
        if i >= nodes.len() {
            break;
        }
        // Detach the promoted node from its cycle parent so it is not visited twice.
        for list in children.iter_mut() {
            list.retain(|&c| c != i);
        }
        seen[i] = true;
        roots.push(i);
        queue.push_back(i);
    }

    for (i, n) in nodes.iter().enumerate() {
        let expanded = n.meta.expanded.unwrap_or(match policy {
            ExpandPolicy::ExpandAll => true,
            ExpandPolicy::RespectSaved => !collapsed.contains(n.id.as_str()),
        });
        if !expanded {
            children[i].clear();
        }
    }

    Forest { children, roots }
}

struct Placer<'a> {
    forest: &'a Forest,
    params: &'a LayoutParams,
    size_b: Vec<f64>,
    size_d: Vec<f64>,
    extent: Vec<f64>,
    /// `(breadth, depth, level)` of each placed node.
    placed: Vec<Option<(f64, f64, usize)>>,
}

impl Placer<'_> {
    fn is_compact(&self, i: usize) -> bool {
        let kids = &self.forest.children[i];
        kids.len() >= 2 && kids.iter().all(|&k| self.forest.children[k].is_empty())
    }

    fn column_width(&self, i: usize) -> f64 {
        self.forest.children[i]
            .iter()
            .map(|&k| self.size_b[k])
            .fold(0.0, f64::max)
    }

    /// Computes the breadth each subtree under `root` needs, children before parents.
    fn measure(&mut self, root: usize) -> f64 {
        let forest = self.forest;
        let mut stack = vec![(root, false)];
        while let Some((i, kids_done)) = stack.pop() {
            let kids = &forest.children[i];
            let compact = self.is_compact(i);
            if !kids_done && !kids.is_empty() && !compact {
                stack.push((i, true));
                stack.extend(kids.iter().map(|&k| (k, false)));
                continue;
            }
            let span = if kids.is_empty() {
                self.size_b[i]
            } else if compact {
                2.0 * self.column_width(i) + self.params.compact_margin_pair
            } else {
                kids.iter().map(|&k| self.extent[k]).sum::<f64>()
                    + self.params.compact_margin_between * (kids.len() - 1) as f64
            };
            self.extent[i] = span.max(self.size_b[i]);
        }
        self.extent[root]
    }

    /// Positions every node under `root`, parents before children. Needs `measure` first.
    fn place(&mut self, root: usize, start_b: f64) {
        let forest = self.forest;
        let mut stack = vec![(root, start_b, 0.0, 0usize)];
        while let Some((i, start_b, d, level)) = stack.pop() {
            let span = self.extent[i];
            let b = start_b + (span - self.size_b[i]) / 2.0;
            self.placed[i] = Some((b, d, level));

            let kids = &forest.children[i];
            if kids.is_empty() {
                continue;
            }
            let child_d = d + self.size_d[i] + self.params.children_margin;

            if self.is_compact(i) {
                let col = self.column_width(i);
                let pair = self.params.compact_margin_pair;
                let block = 2.0 * col + pair;
                let block_start = start_b + (span - block) / 2.0;
                let mut row_d = child_d;
                for row in kids.chunks(2) {
                    let row_depth = row.iter().map(|&k| self.size_d[k]).fold(0.0, f64::max);
                    for (c, &k) in row.iter().enumerate() {
                        let kb = block_start + c as f64 * (col + pair) + (col - self.size_b[k]) / 2.0;
                        self.placed[k] = Some((kb, row_d, level + 1));
                    }
                    row_d += row_depth + self.params.compact_margin_between;
                }
                continue;
            }

            let total: f64 = kids.iter().map(|&k| self.extent[k]).sum::<f64>()
                + self.params.compact_margin_between * (kids.len() - 1) as f64;
            let mut cursor = start_b + (span - total) / 2.0;
            for &k in kids {
                stack.push((k, cursor, child_d, level + 1));
                cursor += self.extent[k] + self.params.compact_margin_between;
            }
        }
    }
}

/// Lays out the visible part of `chart` with the given spacing. Coordinates start at `(0,0)`.
pub fn layout_chart(chart: &ChartDocument, params: &LayoutParams, policy: ExpandPolicy) -> TreeLayout {
    let forest = build_forest(chart, policy);
    let direction = chart.layout;
    let n = chart.nodes.len();

    let heights: Vec<f64> = chart.nodes.iter().map(node_height).collect();
    let (size_b, size_d) = if direction.is_vertical() {
        (vec![params.node_width; n], heights.clone())
    } else {
        (heights.clone(), vec![params.node_width; n])
    };

    let mut placer = Placer {
        forest: &forest,
        params,
        size_b,
        size_d,
        extent: vec![0.0; n],
        placed: vec![None; n],
    };

    let mut cursor = 0.0;
    for &r in &forest.roots {
        let span = placer.measure(r);
        placer.place(r, cursor);
        cursor += span + params.compact_margin_pair;
    }

    let mut order: Vec<usize> = Vec::new();
    let mut slot: Vec<Option<usize>> = vec![None; n];
    let mut total_b: f64 = 0.0;
    let mut total_d: f64 = 0.0;
    for i in 0..n {
        if let Some((b, d, _)) = placer.placed[i] {
            slot[i] = Some(order.len());
            order.push(i);
            total_b = total_b.max(b + placer.size_b[i]);
            total_d = total_d.max(d + placer.size_d[i]);
        }
    }

    let nodes = order
        .iter()
        .map(|&i| {
            let (b, d, level) = placer.placed[i].unwrap_or((0.0, 0.0, 0));
            let (sb, sd) = (placer.size_b[i], placer.size_d[i]);
            let (x, y, width, height) = match direction {
                LayoutDirection::Top => (b, d, sb, sd),
                LayoutDirection::Bottom => (b, total_d - d - sd, sb, sd),
                LayoutDirection::Left => (d, b, sd, sb),
                LayoutDirection::Right => (total_d - d - sd, b, sd, sb),
            };
            NodeBox {
                node: i,
                x,
                y,
                width,
                height,
                level,
            }
        })
        .collect();

    let mut links = Vec::new();
    for &p in &order {
        for &c in &forest.children[p] {
            if let (Some(ps), Some(cs)) = (slot[p], slot[c]) {
                links.push(LayoutLink {
                    parent: ps,
                    child: cs,
                });
            }
        }
    }

    let (width, height) = if direction.is_vertical() {
        (total_b, total_d)
    } else {
        (total_d, total_b)
    };

    TreeLayout {
        direction,
        nodes,
        links,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartbook_core::{Person, RoleGroup};

    fn chart(nodes: Vec<ChartNode>) -> ChartDocument {
        let mut c = ChartDocument::new("c", "Chart");
        c.nodes = nodes;
        c
    }

    fn overlaps(a: &NodeBox, b: &NodeBox) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    fn org() -> Vec<ChartNode> {
        vec![
            ChartNode::new("ceo", None),
            ChartNode::new("cto", Some("ceo")),
            ChartNode::new("cfo", Some("ceo")),
            ChartNode::new("eng1", Some("cto")),
            ChartNode::new("eng2", Some("cto")),
            ChartNode::new("eng3", Some("cto")),
            ChartNode::new("acct", Some("cfo")),
            ChartNode::new("audit", Some("acct")),
        ]
    }

    #[test]
    fn node_height_grows_with_members() {
        let mut n = ChartNode::new("n", None);
        assert_eq!(node_height(&n), MIN_NODE_HEIGHT);
        n.members.push(RoleGroup {
            role: "Engineers".to_string(),
            people: (0..5)
                .map(|i| Person {
                    name: format!("p{i}"),
                    title: None,
                })
                .collect(),
        });
        assert_eq!(node_height(&n), 40.0 + 22.0 + 100.0 + 16.0);
    }

    #[test]
    fn children_sit_below_parent_and_never_overlap() {
        let params = LayoutParams::default();
        let layout = layout_chart(&chart(org()), &params, ExpandPolicy::ExpandAll);
        assert_eq!(layout.nodes.len(), 8);
        assert_eq!(layout.links.len(), 7);

        for link in &layout.links {
            let p = &layout.nodes[link.parent];
            let c = &layout.nodes[link.child];
            assert!(c.y >= p.y + p.height + params.children_margin - 1e-9);
        }
        for (i, a) in layout.nodes.iter().enumerate() {
            for b in &layout.nodes[i + 1..] {
                assert!(!overlaps(a, b), "nodes {} and {} overlap", a.node, b.node);
            }
        }
    }

    #[test]
    fn leaf_siblings_form_two_column_block() {
        let params = LayoutParams::default();
        let layout = layout_chart(&chart(org()), &params, ExpandPolicy::ExpandAll);
        let by_node = |i: usize| layout.nodes.iter().find(|b| b.node == i).unwrap();
        let (e1, e2, e3) = (by_node(3), by_node(4), by_node(5));
        assert_eq!(e1.y, e2.y);
        assert!((e2.x - e1.x - (params.node_width + params.compact_margin_pair)).abs() < 1e-9);
        assert_eq!(e3.x, e1.x);
        assert!(e3.y > e1.y);
    }

    #[test]
    fn saved_collapse_is_ignored_unless_requested() {
        let mut c = chart(org());
        c.view_state.collapsed_nodes = vec!["cto".to_string()];
        let all = layout_chart(&c, &LayoutParams::default(), ExpandPolicy::ExpandAll);
        assert_eq!(all.nodes.len(), 8);
        let saved = layout_chart(&c, &LayoutParams::default(), ExpandPolicy::RespectSaved);
        assert_eq!(saved.nodes.len(), 5);
    }

    #[test]
    fn explicit_override_beats_expand_all() {
        let mut nodes = org();
        nodes[2].meta.expanded = Some(false);
        let layout = layout_chart(&chart(nodes), &LayoutParams::default(), ExpandPolicy::ExpandAll);
        assert_eq!(layout.nodes.len(), 6);

        let mut c = chart(org());
        c.view_state.collapsed_nodes = vec!["cfo".to_string()];
        c.nodes[2].meta.expanded = Some(true);
        let layout = layout_chart(&c, &LayoutParams::default(), ExpandPolicy::RespectSaved);
        assert_eq!(layout.nodes.len(), 8);
    }

    #[test]
    fn left_direction_grows_along_x() {
        let mut c = chart(org());
        c.layout = LayoutDirection::Left;
        let params = LayoutParams::default();
        let layout = layout_chart(&c, &params, ExpandPolicy::ExpandAll);
        let root = layout.nodes.iter().find(|b| b.node == 0).unwrap();
        assert_eq!(root.x, 0.0);
        assert_eq!(root.width, params.node_width);
        for b in &layout.nodes {
            if b.node != 0 {
                assert!(b.x > root.x);
            }
        }
        assert!(layout.width > layout.height);
    }

    #[test]
    fn bottom_direction_puts_root_last() {
        let mut c = chart(org());
        c.layout = LayoutDirection::Bottom;
        let layout = layout_chart(&c, &LayoutParams::default(), ExpandPolicy::ExpandAll);
        let root = layout.nodes.iter().find(|b| b.node == 0).unwrap();
        assert!((root.y + root.height - layout.height).abs() < 1e-9);
    }

    #[test]
    fn cycle_members_are_still_placed() {
        let nodes = vec![
            ChartNode::new("a", Some("b")),
            ChartNode::new("b", Some("a")),
        ];
        let layout = layout_chart(&chart(nodes), &LayoutParams::default(), ExpandPolicy::ExpandAll);
        assert_eq!(layout.nodes.len(), 2);
        assert_eq!(layout.links.len(), 1);
    }

    #[test]
    fn very_deep_reporting_chain_is_laid_out() {
        const DEPTH: usize = 20_000;
        let ids: Vec<String> = (0..DEPTH).map(|i| format!("n{i}")).collect();
        let nodes = ids
            .iter()
            .enumerate()
            .map(|(i, id)| ChartNode::new(id, i.checked_sub(1).map(|p| ids[p].as_str())))
            .collect();
        let layout = layout_chart(&chart(nodes), &LayoutParams::default(), ExpandPolicy::ExpandAll);
        assert_eq!(layout.nodes.len(), DEPTH);
        assert_eq!(layout.links.len(), DEPTH - 1);
        let last = layout.nodes.iter().find(|b| b.node == DEPTH - 1).unwrap();
        assert_eq!(last.level, DEPTH - 1);
        for pair in layout.nodes.windows(2) {
            assert!(pair[1].y > pair[0].y);
            assert!((pair[1].x - pair[0].x).abs() < 1e-9);
        }
    }
}
