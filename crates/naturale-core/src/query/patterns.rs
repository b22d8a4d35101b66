//! Lexical pattern library.
//!
//! Every detector here is a pure function over case-normalized text. The
//! tables are declarative so each category can be tested on its own; within
//! a category the first matching rule wins.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::query::fields;
use crate::query::structured::{SortDirection, SortSpec, TimeRange, TimeRangeKind};

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static PRIORITY_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:priority[\s-]*|p)([1-4])\b").unwrap());
static LAST_DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:last|past)\s+(\d{1,3})\s+days?\b").unwrap());
static WORK_ITEM_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)\b").unwrap());
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)@([A-Za-z0-9._-]+)").unwrap());

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Lower-case and collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    WHITESPACE_RE
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `word` (which may span several words) occurs in `text` with a
/// non-word character or the text edge on both sides.
pub fn contains_word(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    text.match_indices(word).any(|(idx, _)| {
        let before_ok = text[..idx].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok = text[idx + word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        before_ok && after_ok
    })
}

/// Word-bounded and plural-tolerant: `bug` matches `bugs`, `story` matches
/// `stories`.
pub fn contains_term(text: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return false;
    }
    if contains_word(text, &term)
        || contains_word(text, &format!("{term}s"))
        || contains_word(text, &format!("{term}es"))
    {
        return true;
    }
    match term.strip_suffix('y') {
        Some(stem) => contains_word(text, &format!("{stem}ies")),
        None => false,
    }
}

fn any_word(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_word(text, p))
}

/// The word immediately following the first word-bounded `phrase`.
pub fn word_after<'a>(text: &'a str, phrase: &str) -> Option<&'a str> {
    let (idx, _) = text.match_indices(phrase).find(|(idx, _)| {
        text[..*idx].chars().next_back().map_or(true, |c| !is_word_char(c))
    })?;
    text[idx + phrase.len()..]
        .split(|c: char| !is_word_char(c) && c != '@')
        .find(|w| !w.is_empty())
}

// ---------------------------------------------------------------------------
// Work-item type aliases
// ---------------------------------------------------------------------------

pub struct TypeAlias {
    pub type_name: &'static str,
    pub aliases: &'static [&'static str],
}

pub const TYPE_ALIASES: &[TypeAlias] = &[
    TypeAlias { type_name: "Bug", aliases: &["bug", "defect", "issue"] },
    TypeAlias { type_name: "User Story", aliases: &["story", "user story", "requirement"] },
    TypeAlias { type_name: "Task", aliases: &["task", "work item", "todo"] },
    TypeAlias { type_name: "Feature", aliases: &["feature"] },
    TypeAlias { type_name: "Epic", aliases: &["epic"] },
    TypeAlias { type_name: "Test Case", aliases: &["test", "test case"] },
];

pub fn type_aliases(type_name: &str) -> &'static [&'static str] {
    TYPE_ALIASES
        .iter()
        .find(|a| a.type_name.eq_ignore_ascii_case(type_name))
        .map_or(&[], |a| a.aliases)
}

/// Whether `text` names a work-item type by display name, reference name,
/// or one of its aliases.
pub fn mentions_type(text: &str, type_name: &str, reference_name: &str) -> bool {
    contains_term(text, type_name)
        || (!reference_name.is_empty() && text.contains(&reference_name.to_lowercase()))
        || type_aliases(type_name).iter().any(|a| contains_term(text, a))
}

// ---------------------------------------------------------------------------
// Assignment and authorship
// ---------------------------------------------------------------------------

pub const ASSIGNED_TO_ME: &[&str] = &["assigned to me", "my", "for me", "mine", "@me"];
pub const CREATED_BY_ME: &[&str] = &[
    "created by me",
    "i created",
    "i opened",
    "i reported",
    "i filed",
    "opened by me",
    "reported by me",
];

pub fn detect_assigned_to_me(text: &str) -> bool {
    any_word(text, ASSIGNED_TO_ME)
}

pub fn detect_created_by_me(text: &str) -> bool {
    any_word(text, CREATED_BY_ME)
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

pub struct StateGroup {
    pub name: &'static str,
    pub phrases: &'static [&'static str],
    pub states: &'static [&'static str],
}

pub const STATE_GROUPS: &[StateGroup] = &[
    StateGroup { name: "open", phrases: &["open", "unresolved"], states: &["New", "Active"] },
    StateGroup { name: "new", phrases: &["new", "untriaged"], states: &["New"] },
    StateGroup {
        name: "active",
        phrases: &["active", "in progress", "working", "started"],
        states: &["Active"],
    },
    StateGroup { name: "resolved", phrases: &["resolved", "fixed"], states: &["Resolved"] },
    StateGroup {
        name: "closed",
        phrases: &["closed", "done", "completed", "finished"],
        states: &["Closed", "Done"],
    },
];

/// Union of every matching state group, first-seen order, no duplicates.
pub fn detect_states(text: &str) -> Vec<String> {
    let mut states: Vec<String> = Vec::new();
    for group in STATE_GROUPS {
        if any_word(text, group.phrases) {
            for state in group.states {
                if !states.iter().any(|s| s == state) {
                    states.push((*state).to_string());
                }
            }
        }
    }
    states
}

// ---------------------------------------------------------------------------
// Priorities
// ---------------------------------------------------------------------------

pub struct PriorityRule {
    pub phrases: &'static [&'static str],
    pub values: &'static [u8],
}

pub const PRIORITY_RULES: &[PriorityRule] = &[
    PriorityRule { phrases: &["critical", "urgent", "blocker", "top priority"], values: &[1] },
    PriorityRule { phrases: &["high priority", "high-priority", "important"], values: &[1, 2] },
    PriorityRule { phrases: &["medium priority", "normal priority"], values: &[2, 3] },
    PriorityRule { phrases: &["low priority", "low-priority", "minor"], values: &[3, 4] },
];

/// Priority values the text asks for. An explicit `priority N` / `pN` wins
/// over the descriptive rules.
pub fn detect_priority(text: &str) -> Option<Vec<u8>> {
    if let Some(caps) = PRIORITY_NUMBER_RE.captures(text) {
        if let Ok(value) = caps[1].parse::<u8>() {
            return Some(vec![value]);
        }
    }
    PRIORITY_RULES
        .iter()
        .find(|rule| any_word(text, rule.phrases))
        .map(|rule| rule.values.to_vec())
}

// ---------------------------------------------------------------------------
// Relative time
// ---------------------------------------------------------------------------

pub struct TimeRule {
    pub kind: TimeRangeKind,
    pub phrases: &'static [&'static str],
}

pub const TIME_RULES: &[TimeRule] = &[
    TimeRule { kind: TimeRangeKind::Yesterday, phrases: &["yesterday"] },
    TimeRule { kind: TimeRangeKind::Today, phrases: &["today", "this day"] },
    TimeRule { kind: TimeRangeKind::LastWeek, phrases: &["last week", "previous week"] },
    TimeRule { kind: TimeRangeKind::ThisWeek, phrases: &["this week", "current week"] },
    TimeRule { kind: TimeRangeKind::LastMonth, phrases: &["last month", "previous month"] },
    TimeRule { kind: TimeRangeKind::ThisMonth, phrases: &["this month", "current month"] },
    TimeRule {
        kind: TimeRangeKind::LastSprint,
        phrases: &["last sprint", "previous sprint", "last iteration", "previous iteration"],
    },
    TimeRule {
        kind: TimeRangeKind::ThisSprint,
        phrases: &["this sprint", "current sprint", "this iteration", "current iteration"],
    },
];

/// Words that move a date range from the changed date to the created date.
pub const CREATION_WORDS: &[&str] = &["created", "opened", "reported", "filed", "raised"];

pub fn detect_time_range(text: &str) -> Option<TimeRange> {
    let kind = TIME_RULES
        .iter()
        .find(|rule| any_word(text, rule.phrases))
        .map(|rule| rule.kind)
        .or_else(|| {
            LAST_DAYS_RE
                .captures(text)
                .and_then(|caps| caps[1].parse::<u32>().ok())
                .filter(|days| *days > 0)
                .map(TimeRangeKind::LastDays)
        })?;
    let date_field = if any_word(text, CREATION_WORDS) {
        fields::CREATED_DATE
    } else {
        fields::CHANGED_DATE
    };
    Some(TimeRange::for_kind(kind, date_field))
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

pub struct SortRule {
    pub phrases: &'static [&'static str],
    pub field: &'static str,
    pub direction: SortDirection,
}

pub const SORT_RULES: &[SortRule] = &[
    SortRule {
        phrases: &["recently updated", "recently changed", "last updated"],
        field: fields::CHANGED_DATE,
        direction: SortDirection::Desc,
    },
    SortRule {
        phrases: &["newest", "latest", "most recent", "newest first"],
        field: fields::CREATED_DATE,
        direction: SortDirection::Desc,
    },
    SortRule {
        phrases: &["oldest", "oldest first"],
        field: fields::CREATED_DATE,
        direction: SortDirection::Asc,
    },
    SortRule {
        phrases: &["by priority", "sorted by priority", "ordered by priority"],
        field: fields::PRIORITY,
        direction: SortDirection::Asc,
    },
    SortRule {
        phrases: &["by title", "alphabetical", "alphabetically"],
        field: fields::TITLE,
        direction: SortDirection::Asc,
    },
];

pub fn detect_sort(text: &str) -> Option<SortSpec> {
    SORT_RULES
        .iter()
        .find(|rule| any_word(text, rule.phrases))
        .map(|rule| SortSpec::new(rule.field, rule.direction))
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// `#123` style work-item references, in order, de-duplicated.
pub fn detect_work_item_ids(text: &str) -> Vec<u64> {
    let mut ids: Vec<u64> = Vec::new();
    for caps in WORK_ITEM_ID_RE.captures_iter(text) {
        if let Ok(id) = caps[1].parse::<u64>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// `@alias` mentions other than `@me`. Works on raw (not lower-cased) text so
/// aliases keep their case.
pub fn detect_mentions(text: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    for caps in MENTION_RE.captures_iter(text) {
        let alias = caps[1].trim_end_matches('.');
        if alias.is_empty() || alias.eq_ignore_ascii_case("me") {
            continue;
        }
        if !mentions.iter().any(|m| m == alias) {
            mentions.push(alias.to_string());
        }
    }
    mentions
}

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Search,
    Filter,
    Count,
    Sort,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Search => "search",
            Intent::Filter => "filter",
            Intent::Count => "count",
            Intent::Sort => "sort",
        }
    }
}

const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::Count, &["how many", "count", "number of"]),
    (Intent::Sort, &["sort", "order by", "ordered by", "sorted by", "arrange"]),
    (Intent::Filter, &["filter", "where", "with", "having"]),
    (Intent::Search, &["find", "search", "show", "get", "list", "display"]),
];

pub fn detect_intent(text: &str) -> Intent {
    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| any_word(text, keywords))
        .map_or(Intent::Search, |(intent, _)| *intent)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Assignment,
    Authorship,
    State,
    Priority,
    Time,
    Sort,
    Entity,
}

/// A named boolean view of one detector.
pub struct Detector {
    pub name: &'static str,
    pub category: Category,
    pub matches: fn(&str) -> bool,
}

pub const REGISTRY: &[Detector] = &[
    Detector { name: "assigned_to_me", category: Category::Assignment, matches: detect_assigned_to_me },
    Detector { name: "created_by_me", category: Category::Authorship, matches: detect_created_by_me },
    Detector { name: "state", category: Category::State, matches: has_state },
    Detector { name: "priority", category: Category::Priority, matches: has_priority },
    Detector { name: "time_range", category: Category::Time, matches: has_time_range },
    Detector { name: "sort", category: Category::Sort, matches: has_sort },
    Detector { name: "work_item_ids", category: Category::Entity, matches: has_work_item_ids },
    Detector { name: "mentions", category: Category::Entity, matches: has_mentions },
];

fn has_state(text: &str) -> bool {
    !detect_states(text).is_empty()
}

fn has_priority(text: &str) -> bool {
    detect_priority(text).is_some()
}

fn has_time_range(text: &str) -> bool {
    detect_time_range(text).is_some()
}

fn has_sort(text: &str) -> bool {
    detect_sort(text).is_some()
}

fn has_work_item_ids(text: &str) -> bool {
    !detect_work_item_ids(text).is_empty()
}

fn has_mentions(text: &str) -> bool {
    !detect_mentions(text).is_empty()
}

/// Names of every registry detector that fires on `text`.
pub fn matched_detectors(text: &str) -> Vec<&'static str> {
    REGISTRY
        .iter()
        .filter(|d| (d.matches)(text))
        .map(|d| d.name)
        .collect()
}
