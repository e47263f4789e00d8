use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Group key used for charts that have no `coverId`.
pub const NO_COVER: &str = "no-cover";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutDirection {
    #[default]
    Top,
    Left,
    Right,
    Bottom,
}

impl LayoutDirection {
    /// True when siblings spread along the x axis.
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Top | Self::Bottom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub collapsed_nodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGroup {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub people: Vec<Person>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    #[serde(default)]
    pub label: Option<String>,
    /// Explicit expand/collapse override. Wins over both the saved view state and the
    /// export-time "expand everything" default.
    #[serde(default)]
    pub expanded: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartNode {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub members: Vec<RoleGroup>,
    #[serde(default)]
    pub meta: NodeMeta,
}

impl ChartNode {
    pub fn new(id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            members: Vec::new(),
            meta: NodeMeta::default(),
        }
    }

    pub fn person_count(&self) -> usize {
        self.members.iter().map(|g| g.people.len()).sum()
    }

    /// A node holding exactly one person without a role heading (older chart format).
    pub fn is_single_person(&self) -> bool {
        self.members.len() == 1
            && self.members[0].role.trim().is_empty()
            && self.members[0].people.len() == 1
    }

    /// Header text for the node: the explicit label, else the first role, else the id.
    pub fn display_label(&self) -> &str {
        if let Some(label) = self.meta.label.as_deref().filter(|s| !s.trim().is_empty()) {
            return label;
        }
        if let Some(group) = self.members.iter().find(|g| !g.role.trim().is_empty()) {
            return &group.role;
        }
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub department_tag: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<ChartNode>,
    #[serde(default)]
    pub layout: LayoutDirection,
    #[serde(default)]
    pub view_state: ViewState,
    #[serde(default)]
    pub cover_id: Option<String>,
    #[serde(default)]
    pub cover_order_index: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ChartDocument {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            department_tag: None,
            description: None,
            nodes: Vec::new(),
            layout: LayoutDirection::default(),
            view_state: ViewState::default(),
            cover_id: None,
            cover_order_index: None,
            created_at: None,
            last_modified: None,
        }
    }

    /// The group this chart is bucketed into when the document is assembled.
    pub fn cover_key(&self) -> &str {
        self.cover_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_COVER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_document_parses_camel_case_json() {
        let json = r#"{
            "id": "c1",
            "name": "Engineering",
            "departmentTag": "ENG",
            "layout": "left",
            "viewState": { "collapsedNodes": ["n2"] },
            "coverId": "eng",
            "coverOrderIndex": 3,
            "createdAt": "2024-03-01T10:00:00Z",
            "nodes": [
                { "id": "n1", "members": [{ "role": "CTO", "people": [{ "name": "Ada" }] }] },
                { "id": "n2", "parentId": "n1", "meta": { "expanded": false, "color": "red" } }
            ],
            "ownerEmail": "ignored@example.com"
        }"#;
        let chart: ChartDocument = serde_json::from_str(json).unwrap();
        assert_eq!(chart.layout, LayoutDirection::Left);
        assert_eq!(chart.view_state.collapsed_nodes, vec!["n2".to_string()]);
        assert_eq!(chart.cover_key(), "eng");
        assert_eq!(chart.cover_order_index, Some(3));
        assert!(chart.created_at.is_some());
        assert_eq!(chart.nodes[1].parent_id.as_deref(), Some("n1"));
        assert_eq!(chart.nodes[1].meta.expanded, Some(false));
        assert_eq!(chart.nodes[1].meta.extra.get("color"), Some(&Value::from("red")));
        assert_eq!(chart.nodes[0].display_label(), "CTO");
    }

    #[test]
    fn blank_cover_id_falls_back_to_sentinel() {
        let mut chart = ChartDocument::new("c", "C");
        assert_eq!(chart.cover_key(), NO_COVER);
        chart.cover_id = Some("  ".to_string());
        assert_eq!(chart.cover_key(), NO_COVER);
    }

    #[test]
    fn single_person_variant_requires_unnamed_role() {
        let mut node = ChartNode::new("n", None);
        node.members.push(RoleGroup {
            role: String::new(),
            people: vec![Person {
                name: "Grace".to_string(),
                title: None,
            }],
        });
        assert!(node.is_single_person());
        node.members[0].role = "Lead".to_string();
        assert!(!node.is_single_person());
    }
}
