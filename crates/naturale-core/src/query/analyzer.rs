//! Text + metadata snapshot -> structured query.
//!
//! Detection order is fixed: work-item types, common-field phrases,
//! assignment, authorship, state, priority, time range, sort, work-item ids,
//! mentions, team members. The first detector to claim a field keeps it;
//! mentions and team members only count when they claim the assignee.

use tracing::debug;

use crate::models::{MetadataSnapshot, TranslationContext};
use crate::query::fields;
use crate::query::patterns::{self, contains_word};
use crate::query::structured::{Predicate, StructuredQuery, Value};

pub const TYPE_WEIGHT: f64 = 0.2;
pub const COMMON_FIELD_WEIGHT: f64 = 0.1;
pub const ASSIGNMENT_WEIGHT: f64 = 0.3;
pub const AUTHORSHIP_WEIGHT: f64 = 0.3;
pub const STATE_WEIGHT: f64 = 0.2;
pub const PRIORITY_WEIGHT: f64 = 0.2;
pub const TIME_WEIGHT: f64 = 0.2;
pub const SUPPLEMENTARY_WEIGHT: f64 = 0.1;

/// Below this a query is considered vague enough to deserve a hint.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Requests that exercise most detectors; also used to seed AI prompts.
pub const EXAMPLE_QUERIES: &[&str] = &[
    "Show me my bugs",
    "High priority user stories assigned to me",
    "Tasks created this week",
    "Resolved bugs from last sprint",
    "All user stories in current iteration",
    "Critical issues assigned to @john.doe",
    "Work items I created this month",
    "Active tasks with priority 1",
];

pub fn analyze(text: &str, snapshot: &MetadataSnapshot, context: &TranslationContext) -> StructuredQuery {
    let normalized = patterns::normalize(text);
    let mut query = StructuredQuery::new(text.trim());
    query.intent = patterns::detect_intent(&normalized);

    detect_types(&normalized, snapshot, &mut query);
    detect_common_fields(&normalized, snapshot, &mut query);

    if patterns::detect_assigned_to_me(&normalized) {
        query.set_predicate(fields::ASSIGNED_TO, Predicate::equals(Value::me()));
        query.add_signal(ASSIGNMENT_WEIGHT, "Assigned to current user");
    }

    if patterns::detect_created_by_me(&normalized) {
        query.set_predicate(fields::CREATED_BY, Predicate::equals(Value::me()));
        query.add_signal(AUTHORSHIP_WEIGHT, "Created by current user");
    }

    let states = narrow_states(patterns::detect_states(&normalized), snapshot);
    if !states.is_empty() {
        let reason = format!("State: {}", states.join(", "));
        query.set_predicate(
            fields::STATE,
            Predicate::any_of(states.into_iter().map(Value::Literal).collect()),
        );
        query.add_signal(STATE_WEIGHT, reason);
    }

    if let Some(priorities) = patterns::detect_priority(&normalized) {
        let reason = format!(
            "Priority: {}",
            priorities.iter().map(u8::to_string).collect::<Vec<_>>().join(", ")
        );
        query.set_predicate(
            fields::PRIORITY,
            Predicate::any_of(priorities.into_iter().map(|p| Value::Number(i64::from(p))).collect()),
        );
        query.add_signal(PRIORITY_WEIGHT, reason);
    }

    if let Some(range) = patterns::detect_time_range(&normalized) {
        let reason = format!("Time range: {}", range.kind.describe());
        query.time_range = Some(range);
        query.add_signal(TIME_WEIGHT, reason);
    }

    if let Some(sort) = patterns::detect_sort(&normalized) {
        let reason = format!("Sort: {} {}", sort.field, sort.direction.as_str());
        query.sort = Some(sort);
        query.add_signal(SUPPLEMENTARY_WEIGHT, reason);
    }

    let ids = patterns::detect_work_item_ids(&normalized);
    if !ids.is_empty() {
        let reason = format!(
            "Work item ids: {}",
            ids.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")
        );
        let values = ids
            .into_iter()
            .filter_map(|id| i64::try_from(id).ok())
            .map(Value::Number)
            .collect();
        query.set_predicate(fields::ID, Predicate::any_of(values));
        query.add_signal(SUPPLEMENTARY_WEIGHT, reason);
    }

    if let Some(alias) = patterns::detect_mentions(text).into_iter().next() {
        if query.set_predicate(fields::ASSIGNED_TO, Predicate::contains(alias.clone())) {
            query.add_signal(SUPPLEMENTARY_WEIGHT, format!("Mentioned user: {alias}"));
        }
    }

    detect_team_member(&normalized, snapshot, context, &mut query);

    debug!(
        detectors = ?patterns::matched_detectors(&normalized),
        intent = query.intent.as_str(),
        confidence = query.confidence,
        "analyzed query"
    );
    query
}

fn detect_types(text: &str, snapshot: &MetadataSnapshot, query: &mut StructuredQuery) {
    for (name, info) in &snapshot.work_item_types {
        if patterns::mentions_type(text, name, &info.reference_name) && query.add_type(name) {
            query.add_signal(TYPE_WEIGHT, format!("Work item type: {name}"));
        }
    }
}

fn detect_common_fields(text: &str, snapshot: &MetadataSnapshot, query: &mut StructuredQuery) {
    for (phrase, field) in &snapshot.common_fields {
        if !contains_word(text, phrase) {
            continue;
        }
        let refers_to_me = fields::IDENTITY_FIELDS.contains(&field.as_str())
            && patterns::word_after(text, phrase) == Some("me");
        let predicate = if refers_to_me {
            Predicate::equals(Value::me())
        } else {
            Predicate::Mentioned
        };
        query.set_predicate(field, predicate);
        query.add_signal(COMMON_FIELD_WEIGHT, format!("Field: {phrase}"));
    }
}

/// Keep only states the project actually defines, using the project's
/// casing. Unknown sets and empty results leave the list untouched.
fn narrow_states(states: Vec<String>, snapshot: &MetadataSnapshot) -> Vec<String> {
    if states.is_empty() {
        return states;
    }
    let allowed = snapshot.allowed_values(fields::STATE);
    if allowed.is_empty() {
        return states;
    }
    let narrowed: Vec<String> = states
        .iter()
        .filter_map(|s| allowed.iter().find(|a| a.eq_ignore_ascii_case(s)).cloned())
        .collect();
    if narrowed.is_empty() {
        states
    } else {
        narrowed
    }
}

fn detect_team_member(
    text: &str,
    snapshot: &MetadataSnapshot,
    context: &TranslationContext,
    query: &mut StructuredQuery,
) {
    let member = snapshot.team_members.iter().find(|m| {
        let display = m.display_name.trim().to_lowercase();
        let unique = m.unique_name.trim().to_lowercase();
        (!display.is_empty() && contains_word(text, &display))
            || (!unique.is_empty() && contains_word(text, &unique))
    });
    let Some(member) = member else {
        return;
    };
    let is_current_user = context.current_user.as_deref().is_some_and(|user| {
        user.eq_ignore_ascii_case(&member.unique_name) || user.eq_ignore_ascii_case(&member.display_name)
    });
    let value = if is_current_user {
        Value::me()
    } else {
        Value::literal(member.display_name.clone())
    };
    if query.set_predicate(fields::ASSIGNED_TO, Predicate::equals(value)) {
        query.add_signal(SUPPLEMENTARY_WEIGHT, format!("Team member: {}", member.display_name));
    }
}

/// Hints for refining a vague request.
pub fn suggestions(query: &StructuredQuery) -> Vec<String> {
    let mut hints = Vec::new();
    if query.confidence < LOW_CONFIDENCE_THRESHOLD {
        hints.push("Try being more specific about what you're looking for".to_string());
    }
    if query.work_item_types.is_empty() {
        hints.push("Specify work item type (bugs, user stories, tasks, etc.)".to_string());
    }
    if !query.has_condition(fields::ASSIGNED_TO) && !query.has_condition(fields::CREATED_BY) {
        hints.push("Add assignment information (assigned to me, created by me)".to_string());
    }
    if query.time_range.is_none() {
        hints.push("Add time context (this week, last month, etc.)".to_string());
    }
    hints
}
