//! Structured query -> WIQL string + shareable URL.

use serde::Serialize;

use crate::errors::{NaturaleError, NaturaleResult};
use crate::models::{MetadataSnapshot, TranslationContext};
use crate::query::fields;
use crate::query::hosting;
use crate::query::structured::{Predicate, StructuredQuery, TimeRange, Value};
use crate::query::validate;

const BASE_COLUMNS: &[&str] = &[
    fields::ID,
    fields::TITLE,
    fields::WORK_ITEM_TYPE,
    fields::STATE,
    fields::ASSIGNED_TO,
];

/// Fields with a fixed slot in the WHERE clause; everything else follows in
/// insertion order.
const ORDERED_CONDITION_FIELDS: &[&str] = &[
    fields::ASSIGNED_TO,
    fields::CREATED_BY,
    fields::STATE,
    fields::PRIORITY,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub query_string: String,
    pub url: String,
}

/// The single place string literals are quoted.
pub fn escape_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn bracket(field: &str) -> String {
    format!("[{field}]")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Literal(text) => escape_literal(text),
        Value::Number(number) => number.to_string(),
        Value::Macro(token) => token.clone(),
    }
}

fn disjunction(field: &str, values: &[Value]) -> Option<String> {
    match values {
        [] => None,
        [single] => Some(format!("{} = {}", bracket(field), render_value(single))),
        many => {
            let parts: Vec<String> = many
                .iter()
                .map(|v| format!("{} = {}", bracket(field), render_value(v)))
                .collect();
            Some(format!("({})", parts.join(" OR ")))
        }
    }
}

fn render_predicate(field: &str, predicate: &Predicate) -> Option<String> {
    match predicate {
        Predicate::Equals { value } => Some(format!("{} = {}", bracket(field), render_value(value))),
        Predicate::AnyOf { values } => disjunction(field, values),
        Predicate::Compare { op, value } => {
            Some(format!("{} {} {}", bracket(field), op.as_str(), render_value(value)))
        }
        Predicate::Contains { text } => {
            Some(format!("{} CONTAINS {}", bracket(field), escape_literal(text)))
        }
        Predicate::Mentioned => None,
    }
}

fn render_time_range(range: &TimeRange) -> String {
    let field = bracket(&range.field);
    if range.is_iteration() {
        return format!("{field} = {}", range.start);
    }
    match &range.end {
        Some(end) => format!("{field} >= {} AND {field} < {end}", range.start),
        None => format!("{field} >= {}", range.start),
    }
}

/// Whether `field` can be selected against this snapshot. Core system fields
/// always can.
fn is_selectable(field: &str, snapshot: &MetadataSnapshot) -> bool {
    field.starts_with("System.") || snapshot.field(field).is_some()
}

fn select_columns(query: &StructuredQuery, snapshot: &MetadataSnapshot) -> Vec<String> {
    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|f| (*f).to_string()).collect();
    let mut push = |field: &str| {
        if !columns.iter().any(|c| c == field) {
            columns.push(field.to_string());
        }
    };

    let dated = query
        .time_range
        .as_ref()
        .is_some_and(|r| !r.is_iteration())
        || query.predicates.keys().any(|f| fields::is_date(f))
        || query.sort.as_ref().is_some_and(|s| fields::is_date(&s.field));
    if dated {
        push(fields::CREATED_DATE);
        push(fields::CHANGED_DATE);
    }
    if query.time_range.as_ref().is_some_and(TimeRange::is_iteration) {
        push(fields::ITERATION_PATH);
    }
    if query.predicates.contains_key(fields::PRIORITY)
        || query.sort.as_ref().is_some_and(|s| s.field == fields::PRIORITY)
    {
        push(fields::PRIORITY);
    }
    if query.work_item_types.iter().any(|t| t == "Bug") && is_selectable(fields::SEVERITY, snapshot) {
        push(fields::SEVERITY);
    }
    if query.work_item_types.iter().any(|t| t == "User Story")
        && is_selectable(fields::STORY_POINTS, snapshot)
    {
        push(fields::STORY_POINTS);
    }
    for field in query.predicates.keys() {
        if is_selectable(field, snapshot) {
            push(field);
        }
    }
    columns
}

fn where_conditions(query: &StructuredQuery) -> Vec<String> {
    let mut conditions = Vec::new();

    let types: Vec<Value> = query
        .work_item_types
        .iter()
        .map(|t| Value::literal(t.clone()))
        .collect();
    if let Some(condition) = disjunction(fields::WORK_ITEM_TYPE, &types) {
        conditions.push(condition);
    }

    for field in ORDERED_CONDITION_FIELDS {
        if let Some(condition) = query
            .predicates
            .get(*field)
            .and_then(|p| render_predicate(field, p))
        {
            conditions.push(condition);
        }
    }

    if let Some(range) = &query.time_range {
        conditions.push(render_time_range(range));
    }

    for (field, predicate) in &query.predicates {
        if ORDERED_CONDITION_FIELDS.contains(&field.as_str()) {
            continue;
        }
        if let Some(condition) = render_predicate(field, predicate) {
            conditions.push(condition);
        }
    }

    if conditions.is_empty() {
        conditions.push(format!(
            "{} CONTAINS {}",
            bracket(fields::TITLE),
            escape_literal(&query.text)
        ));
    }
    conditions
}

fn order_by(query: &StructuredQuery) -> String {
    if let Some(sort) = &query.sort {
        return format!("{} {}", bracket(&sort.field), sort.direction.as_str());
    }
    if query.has_condition(fields::PRIORITY) {
        return format!(
            "{} ASC, {} DESC",
            bracket(fields::PRIORITY),
            bracket(fields::CREATED_DATE)
        );
    }
    format!("{} DESC", bracket(fields::CHANGED_DATE))
}

/// Render the WIQL text for `query`.
pub fn build_wiql(query: &StructuredQuery, snapshot: &MetadataSnapshot) -> String {
    let columns: Vec<String> = select_columns(query, snapshot)
        .iter()
        .map(|c| bracket(c))
        .collect();
    format!(
        "SELECT {} FROM WorkItems WHERE {} ORDER BY {}",
        columns.join(", "),
        where_conditions(query).join(" AND "),
        order_by(query)
    )
}

/// `{base}?wiql={percent-encoded}`.
pub fn query_url(base: &str, wiql: &str) -> String {
    format!("{base}?wiql={}", urlencoding::encode(wiql))
}

/// Title-contains query used when nothing better is available.
pub fn basic_wiql(text: &str) -> String {
    format!(
        "SELECT [System.Id], [System.Title], [System.WorkItemType], [System.State] FROM WorkItems WHERE [System.Title] CONTAINS {}",
        escape_literal(text.trim())
    )
}

fn require_base(context: &TranslationContext) -> NaturaleResult<String> {
    hosting::query_base(context).ok_or_else(|| {
        NaturaleError::Compile("Unable to determine organization and project for the query URL".to_string())
    })
}

pub fn compile(
    query: &StructuredQuery,
    snapshot: &MetadataSnapshot,
    context: &TranslationContext,
) -> NaturaleResult<CompiledQuery> {
    let base = require_base(context)?;
    let query_string = build_wiql(query, snapshot);
    validate::validate_wiql(&query_string)?;
    let url = query_url(&base, &query_string);
    Ok(CompiledQuery { query_string, url })
}

/// Compile the title-contains fallback for raw `text`.
pub fn compile_basic(text: &str, context: &TranslationContext) -> NaturaleResult<CompiledQuery> {
    let base = require_base(context)?;
    let query_string = basic_wiql(text);
    validate::validate_wiql(&query_string)?;
    let url = query_url(&base, &query_string);
    Ok(CompiledQuery { query_string, url })
}
