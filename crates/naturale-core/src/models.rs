//! Shared typed models used across the metadata, query, and resolution layers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::NaturaleError;

// ---------------------------------------------------------------------------
// Hosting shape and project identity
// ---------------------------------------------------------------------------

/// The two URL shapes the backend is served under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostShape {
    /// `https://dev.azure.com/{org}/{project}`
    #[default]
    PathEmbedded,
    /// `https://{org}.visualstudio.com/{project}`
    Subdomain,
}

impl HostShape {
    /// Infer the shape from any URL on the backend's hosts.
    pub fn detect(url: &str) -> Option<Self> {
        if url.contains("dev.azure.com") {
            Some(HostShape::PathEmbedded)
        } else if url.contains(".visualstudio.com") {
            Some(HostShape::Subdomain)
        } else {
            None
        }
    }

    /// Organization-level site root, without a trailing slash.
    pub fn site_root(&self, organization: &str) -> String {
        match self {
            HostShape::PathEmbedded => {
                format!("https://dev.azure.com/{}", urlencoding::encode(organization))
            }
            HostShape::Subdomain => format!("https://{organization}.visualstudio.com"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostShape::PathEmbedded => "path-embedded",
            HostShape::Subdomain => "subdomain",
        }
    }
}

impl FromStr for HostShape {
    type Err = NaturaleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "path-embedded" | "path" | "dev.azure.com" | "dev-azure" => Ok(HostShape::PathEmbedded),
            "subdomain" | "visualstudio" | "visualstudio.com" => Ok(HostShape::Subdomain),
            other => Err(NaturaleError::Config(format!("unknown host shape: {other}"))),
        }
    }
}

/// Cache key: one organization/project pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectKey {
    pub organization: String,
    pub project: String,
}

impl ProjectKey {
    pub fn new(organization: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
        }
    }

    /// Both identifiers are present and non-blank.
    pub fn is_resolved(&self) -> bool {
        !self.organization.trim().is_empty() && !self.project.trim().is_empty()
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization, self.project)
    }
}

/// A project key together with the host shape used to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectTarget {
    pub key: ProjectKey,
    pub shape: HostShape,
}

impl ProjectTarget {
    pub fn new(organization: impl Into<String>, project: impl Into<String>, shape: HostShape) -> Self {
        Self {
            key: ProjectKey::new(organization, project),
            shape,
        }
    }

    /// Project-level web root, e.g. `https://dev.azure.com/org/project`.
    pub fn project_root(&self) -> String {
        format!(
            "{}/{}",
            self.shape.site_root(&self.key.organization),
            urlencoding::encode(&self.key.project)
        )
    }
}

/// Caller-supplied context for one translation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationContext {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub current_user: Option<String>,
    pub current_iteration: Option<String>,
    pub host_shape: Option<HostShape>,
    /// Ambient page location, used to derive anything not given explicitly.
    pub page_url: Option<String>,
}

impl TranslationContext {
    pub fn new(organization: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            organization: Some(organization.into()),
            project: Some(project.into()),
            ..Self::default()
        }
    }

    pub fn from_page_url(page_url: impl Into<String>) -> Self {
        Self {
            page_url: Some(page_url.into()),
            ..Self::default()
        }
    }

    pub fn with_shape(mut self, shape: HostShape) -> Self {
        self.host_shape = Some(shape);
        self
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }

    pub fn with_current_user(mut self, user: impl Into<String>) -> Self {
        self.current_user = Some(user.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Metadata snapshot
// ---------------------------------------------------------------------------

/// A field as known to the backend, either globally or on one work-item type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldInfo {
    pub name: String,
    pub reference_name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub queryable: bool,
    pub read_only: bool,
    pub is_identity: bool,
    pub is_picklist: bool,
    pub picklist_id: Option<String>,
    pub allowed_values: Vec<String>,
}

impl FieldInfo {
    pub fn new(name: &str, reference_name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            reference_name: reference_name.to_string(),
            field_type: field_type.to_string(),
            queryable: true,
            ..Self::default()
        }
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkItemTypeInfo {
    pub name: String,
    pub reference_name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamMember {
    pub display_name: String,
    pub unique_name: String,
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Iteration {
    pub id: Option<String>,
    pub name: String,
    pub path: String,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
    pub time_frame: Option<String>,
}

impl Iteration {
    /// Whether this iteration is the active one at `now`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        if self.time_frame.as_deref() == Some("current") {
            return true;
        }
        match (self.start_date, self.finish_date) {
            (Some(start), Some(finish)) => start <= now && now <= finish,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Area {
    pub id: Option<i64>,
    pub name: String,
    pub path: String,
}

/// Operator groups understood by the query language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOperators {
    pub equality: Vec<String>,
    pub comparison: Vec<String>,
    pub text: Vec<String>,
    pub list: Vec<String>,
    pub date: Vec<String>,
    pub special: Vec<String>,
}

/// Point-in-time view of a project's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSnapshot {
    pub organization: String,
    pub project: String,
    pub work_item_types: BTreeMap<String, WorkItemTypeInfo>,
    pub fields: BTreeMap<String, FieldInfo>,
    pub team_members: Vec<TeamMember>,
    pub iterations: Vec<Iteration>,
    pub areas: Vec<Area>,
    /// Natural-language phrase -> field reference name, in matching order.
    pub common_fields: IndexMap<String, String>,
    pub query_operators: QueryOperators,
    pub fetched_at: DateTime<Utc>,
    pub is_fallback: bool,
}

impl MetadataSnapshot {
    pub fn key(&self) -> ProjectKey {
        ProjectKey::new(self.organization.clone(), self.project.clone())
    }

    /// Allowed values for a field, merged across the global field map and
    /// every work-item type, first-seen order.
    pub fn allowed_values(&self, reference_name: &str) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        let global = self.fields.get(reference_name).into_iter();
        let per_type = self
            .work_item_types
            .values()
            .filter_map(|t| t.fields.get(reference_name));
        for field in global.chain(per_type) {
            for value in &field.allowed_values {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        values
    }

    /// Look a field up globally first, then on any work-item type.
    pub fn field(&self, reference_name: &str) -> Option<&FieldInfo> {
        self.fields.get(reference_name).or_else(|| {
            self.work_item_types
                .values()
                .find_map(|t| t.fields.get(reference_name))
        })
    }

    pub fn current_iteration(&self, now: DateTime<Utc>) -> Option<&Iteration> {
        self.iterations.iter().find(|it| it.is_current(now))
    }

    pub fn counts(&self) -> SnapshotCounts {
        SnapshotCounts {
            work_item_types: self.work_item_types.len(),
            fields: self.fields.len(),
            team_members: self.team_members.len(),
            iterations: self.iterations.len(),
            areas: self.areas.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCounts {
    pub work_item_types: usize,
    pub fields: usize,
    pub team_members: usize,
    pub iterations: usize,
    pub areas: usize,
}

// ---------------------------------------------------------------------------
// Translation result
// ---------------------------------------------------------------------------

/// Which strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationMethod {
    Ai,
    EnhancedPatterns,
    PatternMatching,
    BasicFallback,
    Error,
}

impl TranslationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationMethod::Ai => "ai",
            TranslationMethod::EnhancedPatterns => "enhanced-patterns",
            TranslationMethod::PatternMatching => "pattern-matching",
            TranslationMethod::BasicFallback => "basic-fallback",
            TranslationMethod::Error => "error",
        }
    }
}

impl fmt::Display for TranslationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The externally visible outcome of one `translate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub success: bool,
    pub url: Option<String>,
    pub query_string: Option<String>,
    pub confidence: f64,
    pub method: TranslationMethod,
    pub reasoning: String,
    pub error: Option<String>,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl TranslationResult {
    pub fn failure(message: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            url: None,
            query_string: None,
            confidence: 0.0,
            method: TranslationMethod::Error,
            reasoning: String::new(),
            error: Some(message.into()),
            processing_time_ms,
            suggestions: Vec::new(),
        }
    }
}
