//! The structured query accumulated by the analyzer and consumed by the
//! compiler.

use indexmap::IndexMap;
use serde::Serialize;

use crate::query::fields;
use crate::query::patterns::Intent;

/// Confidence every query starts from before any signal is added.
pub const BASE_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Rendered single-quoted and escaped.
    Literal(String),
    Number(i64),
    /// A query-language macro such as `@Me`, rendered verbatim.
    Macro(String),
}

impl Value {
    pub fn literal(value: impl Into<String>) -> Self {
        Value::Literal(value.into())
    }

    pub fn me() -> Self {
        Value::Macro("@Me".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Equals { value: Value },
    AnyOf { values: Vec<Value> },
    Compare { op: CompareOp, value: Value },
    Contains { text: String },
    /// Field named without a value; only widens the column selection.
    Mentioned,
}

impl Predicate {
    pub fn equals(value: Value) -> Self {
        Predicate::Equals { value }
    }

    pub fn any_of(values: Vec<Value>) -> Self {
        Predicate::AnyOf { values }
    }

    pub fn contains(text: impl Into<String>) -> Self {
        Predicate::Contains { text: text.into() }
    }

    /// Whether this predicate produces a WHERE condition.
    pub fn is_condition(&self) -> bool {
        !matches!(self, Predicate::Mentioned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRangeKind {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    LastDays(u32),
    ThisSprint,
    LastSprint,
}

impl TimeRangeKind {
    pub fn is_iteration(&self) -> bool {
        matches!(self, TimeRangeKind::ThisSprint | TimeRangeKind::LastSprint)
    }

    pub fn describe(&self) -> String {
        match self {
            TimeRangeKind::Today => "today".to_string(),
            TimeRangeKind::Yesterday => "yesterday".to_string(),
            TimeRangeKind::ThisWeek => "this week".to_string(),
            TimeRangeKind::LastWeek => "last week".to_string(),
            TimeRangeKind::ThisMonth => "this month".to_string(),
            TimeRangeKind::LastMonth => "last month".to_string(),
            TimeRangeKind::LastDays(days) => format!("last {days} days"),
            TimeRangeKind::ThisSprint => "current sprint".to_string(),
            TimeRangeKind::LastSprint => "previous sprint".to_string(),
        }
    }
}

/// A relative window expressed in macro tokens. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub kind: TimeRangeKind,
    pub field: String,
    pub start: String,
    pub end: Option<String>,
}

impl TimeRange {
    /// Build the window for `kind`. Sprint kinds always target the
    /// iteration path; the rest use `date_field`.
    pub fn for_kind(kind: TimeRangeKind, date_field: &str) -> Self {
        let (start, end) = match kind {
            TimeRangeKind::Today => ("@Today".to_string(), None),
            TimeRangeKind::Yesterday => ("@Today - 1".to_string(), Some("@Today".to_string())),
            TimeRangeKind::ThisWeek => ("@StartOfWeek".to_string(), None),
            TimeRangeKind::LastWeek => (
                "@StartOfWeek - 1".to_string(),
                Some("@StartOfWeek".to_string()),
            ),
            TimeRangeKind::ThisMonth => ("@StartOfMonth".to_string(), None),
            TimeRangeKind::LastMonth => (
                "@StartOfMonth - 1".to_string(),
                Some("@StartOfMonth".to_string()),
            ),
            TimeRangeKind::LastDays(days) => (format!("@Today - {days}"), None),
            TimeRangeKind::ThisSprint => ("@CurrentIteration".to_string(), None),
            TimeRangeKind::LastSprint => ("@CurrentIteration - 1".to_string(), None),
        };
        let field = if kind.is_iteration() {
            fields::ITERATION_PATH
        } else {
            date_field
        };
        Self {
            kind,
            field: field.to_string(),
            start,
            end,
        }
    }

    pub fn is_iteration(&self) -> bool {
        self.kind.is_iteration()
    }
}

/// Mutable accumulator for one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub text: String,
    pub intent: Intent,
    pub work_item_types: Vec<String>,
    pub predicates: IndexMap<String, Predicate>,
    pub time_range: Option<TimeRange>,
    pub sort: Option<SortSpec>,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

impl StructuredQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            intent: Intent::Search,
            work_item_types: Vec::new(),
            predicates: IndexMap::new(),
            time_range: None,
            sort: None,
            confidence: BASE_CONFIDENCE,
            reasoning: Vec::new(),
        }
    }

    /// Returns false when the type was already present.
    pub fn add_type(&mut self, type_name: &str) -> bool {
        if self.work_item_types.iter().any(|t| t == type_name) {
            return false;
        }
        self.work_item_types.push(type_name.to_string());
        true
    }

    /// Insert unless the field already carries a predicate. A `Mentioned`
    /// placeholder is upgraded by a real condition.
    pub fn set_predicate(&mut self, field: &str, predicate: Predicate) -> bool {
        match self.predicates.get_mut(field) {
            Some(existing) if existing.is_condition() => false,
            Some(existing) => {
                if predicate.is_condition() {
                    *existing = predicate;
                    true
                } else {
                    false
                }
            }
            None => {
                self.predicates.insert(field.to_string(), predicate);
                true
            }
        }
    }

    pub fn has_condition(&self, field: &str) -> bool {
        self.predicates.get(field).is_some_and(Predicate::is_condition)
    }

    pub fn add_signal(&mut self, weight: f64, reason: impl Into<String>) {
        self.confidence += weight;
        self.reasoning.push(reason.into());
    }

    /// Whether any detector contributed.
    pub fn has_signals(&self) -> bool {
        !self.reasoning.is_empty()
    }

    /// Whether the compiled WHERE clause would contain anything besides the
    /// title-text fallback.
    pub fn has_conditions(&self) -> bool {
        !self.work_item_types.is_empty()
            || self.time_range.is_some()
            || self.predicates.values().any(Predicate::is_condition)
    }

    pub fn reasoning_text(&self) -> String {
        if self.reasoning.is_empty() {
            "Using basic text search".to_string()
        } else {
            self.reasoning.join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_query_starts_at_base_confidence() {
        let query = StructuredQuery::new("anything");
        assert_eq!(query.confidence, BASE_CONFIDENCE);
        assert!(!query.has_signals());
        assert!(!query.has_conditions());
        assert_eq!(query.reasoning_text(), "Using basic text search");
    }

    #[test]
    fn test_set_predicate_keeps_first_condition() {
        let mut query = StructuredQuery::new("x");
        assert!(query.set_predicate(fields::ASSIGNED_TO, Predicate::equals(Value::me())));
        assert!(!query.set_predicate(
            fields::ASSIGNED_TO,
            Predicate::contains("someone")
        ));
        assert_eq!(
            query.predicates[fields::ASSIGNED_TO],
            Predicate::equals(Value::me())
        );
    }

    #[test]
    fn test_mentioned_is_upgraded_by_condition() {
        let mut query = StructuredQuery::new("x");
        assert!(query.set_predicate(fields::PRIORITY, Predicate::Mentioned));
        assert!(!query.has_condition(fields::PRIORITY));
        assert!(query.set_predicate(
            fields::PRIORITY,
            Predicate::any_of(vec![Value::Number(1)])
        ));
        assert!(query.has_condition(fields::PRIORITY));
        assert_eq!(query.predicates.len(), 1);
    }

    #[test]
    fn test_add_type_deduplicates() {
        let mut query = StructuredQuery::new("x");
        assert!(query.add_type("Bug"));
        assert!(!query.add_type("Bug"));
        assert_eq!(query.work_item_types, vec!["Bug"]);
    }

    #[test]
    fn test_time_range_tokens() {
        let range = TimeRange::for_kind(TimeRangeKind::LastMonth, fields::CHANGED_DATE);
        assert_eq!(range.start, "@StartOfMonth - 1");
        assert_eq!(range.end.as_deref(), Some("@StartOfMonth"));
        let range = TimeRange::for_kind(TimeRangeKind::LastSprint, fields::CREATED_DATE);
        assert_eq!(range.field, fields::ITERATION_PATH);
        assert!(range.is_iteration());
    }

    #[test]
    fn test_signals_accumulate_without_bound() {
        let mut query = StructuredQuery::new("x");
        for _ in 0..5 {
            query.add_signal(0.3, "signal");
        }
        assert!(query.confidence > 1.0);
        assert_eq!(query.reasoning_text(), vec!["signal"; 5].join("; "));
    }
}
