//! Serde shapes of the backend REST payloads and their conversion into the
//! crate's models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Area, FieldInfo, Iteration, WorkItemTypeInfo};

/// Envelope used by every list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// Allowed values arrive as strings or numbers depending on the field type.
fn value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn values_to_strings(values: &[serde_json::Value]) -> Vec<String> {
    values.iter().filter_map(value_to_string).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTypeField {
    pub name: String,
    pub reference_name: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub allowed_values: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireWorkItemType {
    pub name: String,
    #[serde(default)]
    pub reference_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<WireTypeField>,
}

impl From<WireWorkItemType> for WorkItemTypeInfo {
    fn from(wire: WireWorkItemType) -> Self {
        let fields = wire
            .fields
            .into_iter()
            .map(|f| {
                let info = FieldInfo::new(
                    &f.name,
                    &f.reference_name,
                    f.field_type.as_deref().unwrap_or_default(),
                )
                .with_allowed_values(values_to_strings(&f.allowed_values));
                (f.reference_name, info)
            })
            .collect();
        WorkItemTypeInfo {
            name: wire.name,
            reference_name: wire.reference_name,
            description: wire.description.filter(|d| !d.is_empty()),
            fields,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireField {
    pub name: String,
    pub reference_name: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub is_queryable: Option<bool>,
    #[serde(default)]
    pub is_identity: bool,
    #[serde(default)]
    pub is_picklist: bool,
    #[serde(default)]
    pub picklist_id: Option<String>,
}

impl From<WireField> for FieldInfo {
    fn from(wire: WireField) -> Self {
        FieldInfo {
            name: wire.name,
            reference_name: wire.reference_name,
            field_type: wire.field_type.unwrap_or_default(),
            queryable: wire.is_queryable.unwrap_or(true),
            read_only: wire.read_only,
            is_identity: wire.is_identity,
            is_picklist: wire.is_picklist,
            picklist_id: wire.picklist_id.filter(|id| !id.is_empty()),
            allowed_values: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WirePicklist {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

impl WirePicklist {
    pub fn into_values(self) -> Vec<String> {
        values_to_strings(&self.items)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireIterationAttributes {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_frame: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireIteration {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub attributes: Option<WireIterationAttributes>,
}

impl From<WireIteration> for Iteration {
    fn from(wire: WireIteration) -> Self {
        let attributes = wire.attributes.unwrap_or_default();
        Iteration {
            id: wire.id,
            name: wire.name,
            path: wire.path,
            start_date: attributes.start_date,
            finish_date: attributes.finish_date,
            time_frame: attributes.time_frame,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireClassificationNode {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub children: Vec<WireClassificationNode>,
}

/// Depth-first flattening into backslash-joined paths, parents first.
pub fn flatten_areas(root: &WireClassificationNode) -> Vec<Area> {
    fn walk(node: &WireClassificationNode, parent: Option<&str>, out: &mut Vec<Area>) {
        let path = match parent {
            Some(parent) => format!("{parent}\\{}", node.name),
            None => node.name.clone(),
        };
        out.push(Area {
            id: node.id,
            name: node.name.clone(),
            path: path.clone(),
        });
        for child in &node.children {
            walk(child, Some(&path), out);
        }
    }
    let mut areas = Vec::new();
    walk(root, None, &mut areas);
    areas
}

#[derive(Debug, Deserialize)]
pub struct WireTeam {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireIdentity {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub unique_name: String,
}

#[derive(Debug, Deserialize)]
pub struct WireTeamMember {
    pub identity: WireIdentity,
}

#[derive(Debug, Serialize)]
pub struct WiqlRequest<'a> {
    pub query: &'a str,
}

/// One row of a query execution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemReference {
    pub id: i64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiqlResponse {
    #[serde(default)]
    pub work_items: Vec<WorkItemReference>,
}
