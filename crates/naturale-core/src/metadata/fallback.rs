//! Fixed schema substituted when live metadata cannot be obtained.

use std::collections::BTreeMap;

use chrono::Utc;
use indexmap::IndexMap;

use crate::models::{FieldInfo, MetadataSnapshot, QueryOperators, WorkItemTypeInfo};
use crate::query::fields;

/// Natural-language phrase -> field reference name. Order is the matching
/// order: longer phrases come before their prefixes.
pub const COMMON_FIELD_PHRASES: &[(&str, &str)] = &[
    ("assigned to", fields::ASSIGNED_TO),
    ("assignee", fields::ASSIGNED_TO),
    ("owner", fields::ASSIGNED_TO),
    ("created by", fields::CREATED_BY),
    ("author", fields::CREATED_BY),
    ("changed by", fields::CHANGED_BY),
    ("modified by", fields::CHANGED_BY),
    ("state", fields::STATE),
    ("status", fields::STATE),
    ("priority", fields::PRIORITY),
    ("severity", fields::SEVERITY),
    ("created date", fields::CREATED_DATE),
    ("created", fields::CREATED_DATE),
    ("modified", fields::CHANGED_DATE),
    ("changed", fields::CHANGED_DATE),
    ("updated", fields::CHANGED_DATE),
    ("title", fields::TITLE),
    ("description", fields::DESCRIPTION),
    ("type", fields::WORK_ITEM_TYPE),
    ("id", fields::ID),
    ("iteration", fields::ITERATION_PATH),
    ("sprint", fields::ITERATION_PATH),
    ("area", fields::AREA_PATH),
    ("story points", fields::STORY_POINTS),
    ("points", fields::STORY_POINTS),
    ("effort", fields::EFFORT),
    ("tags", fields::TAGS),
    ("tag", fields::TAGS),
];

pub fn common_fields() -> IndexMap<String, String> {
    COMMON_FIELD_PHRASES
        .iter()
        .map(|(phrase, field)| ((*phrase).to_string(), (*field).to_string()))
        .collect()
}

pub fn query_operators() -> QueryOperators {
    fn owned(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }
    QueryOperators {
        equality: owned(&["=", "<>", "!="]),
        comparison: owned(&[">", "<", ">=", "<="]),
        text: owned(&["CONTAINS", "CONTAINS WORDS", "DOES NOT CONTAIN", "DOES NOT CONTAIN WORDS"]),
        list: owned(&["IN", "NOT IN"]),
        date: owned(&["@Today", "@StartOfWeek", "@StartOfMonth", "@StartOfYear"]),
        special: owned(&["@Me", "@CurrentIteration", "@TeamAreas"]),
    }
}

fn work_item_type(name: &str, reference_name: &str, states: &[&str], extra: Vec<FieldInfo>) -> WorkItemTypeInfo {
    let mut type_fields = vec![
        FieldInfo::new("Title", fields::TITLE, "String"),
        FieldInfo::new("State", fields::STATE, "String").with_allowed_values(states.iter().copied()),
        FieldInfo {
            is_identity: true,
            ..FieldInfo::new("Assigned To", fields::ASSIGNED_TO, "Identity")
        },
        FieldInfo::new("Priority", fields::PRIORITY, "Integer").with_allowed_values(["1", "2", "3", "4"]),
    ];
    type_fields.extend(extra);
    WorkItemTypeInfo {
        name: name.to_string(),
        reference_name: reference_name.to_string(),
        description: None,
        fields: type_fields
            .into_iter()
            .map(|f| (f.reference_name.clone(), f))
            .collect(),
    }
}

/// The generic Bug / User Story / Task schema, flagged as fallback.
pub fn fallback_snapshot(organization: &str, project: &str) -> MetadataSnapshot {
    let mut work_item_types = BTreeMap::new();
    work_item_types.insert(
        "Bug".to_string(),
        work_item_type(
            "Bug",
            "Microsoft.VSTS.WorkItemTypes.Bug",
            &["New", "Active", "Resolved", "Closed"],
            vec![FieldInfo::new("Severity", fields::SEVERITY, "String").with_allowed_values([
                "1 - Critical",
                "2 - High",
                "3 - Medium",
                "4 - Low",
            ])],
        ),
    );
    work_item_types.insert(
        "User Story".to_string(),
        work_item_type(
            "User Story",
            "Microsoft.VSTS.WorkItemTypes.UserStory",
            &["New", "Active", "Resolved", "Closed"],
            vec![FieldInfo::new("Story Points", fields::STORY_POINTS, "Double")],
        ),
    );
    work_item_types.insert(
        "Task".to_string(),
        work_item_type(
            "Task",
            "Microsoft.VSTS.WorkItemTypes.Task",
            &["New", "Active", "Closed"],
            Vec::new(),
        ),
    );

    MetadataSnapshot {
        organization: organization.to_string(),
        project: project.to_string(),
        work_item_types,
        fields: BTreeMap::new(),
        team_members: Vec::new(),
        iterations: Vec::new(),
        areas: Vec::new(),
        common_fields: common_fields(),
        query_operators: query_operators(),
        fetched_at: Utc::now(),
        is_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_snapshot_shape() {
        let snapshot = fallback_snapshot("acme", "web");
        assert!(snapshot.is_fallback);
        let names: Vec<&str> = snapshot.work_item_types.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Bug", "Task", "User Story"]);
        assert!(snapshot.fields.is_empty());
        assert!(snapshot.iterations.is_empty());
        assert_eq!(snapshot.common_fields.len(), COMMON_FIELD_PHRASES.len());
    }

    #[test]
    fn test_fallback_allowed_values_merge_across_types() {
        let snapshot = fallback_snapshot("acme", "web");
        assert_eq!(
            snapshot.allowed_values(fields::STATE),
            vec!["New", "Active", "Resolved", "Closed"]
        );
        assert_eq!(snapshot.allowed_values(fields::PRIORITY), vec!["1", "2", "3", "4"]);
        let task = &snapshot.work_item_types["Task"];
        assert_eq!(
            task.fields[fields::STATE].allowed_values,
            vec!["New", "Active", "Closed"]
        );
        assert!(snapshot.field(fields::ASSIGNED_TO).is_some_and(|f| f.is_identity));
    }

    #[test]
    fn test_common_fields_keep_longer_phrases_first() {
        let fields = common_fields();
        let position = |phrase: &str| fields.get_index_of(phrase).unwrap();
        assert!(position("created by") < position("created"));
        assert!(position("changed by") < position("changed"));
        assert!(position("story points") < position("points"));
    }
}
