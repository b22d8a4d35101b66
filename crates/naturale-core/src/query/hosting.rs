//! Resolve organization, project, and hosting shape from the translation
//! context or the ambient page URL.

use url::Url;

use crate::models::{HostShape, ProjectTarget, TranslationContext};

const DEFAULT_COLLECTION: &str = "DefaultCollection";

/// Organization, project and shape recovered from a backend page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub organization: String,
    pub project: Option<String>,
    pub shape: HostShape,
}

fn decoded(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Path segments that name a project rather than an area of the site.
fn project_segment(segment: Option<&str>) -> Option<String> {
    segment
        .filter(|s| !s.is_empty() && !s.starts_with('_'))
        .map(decoded)
}

/// Parse `https://dev.azure.com/{org}/{project}/...` or
/// `https://{org}.visualstudio.com[/DefaultCollection]/{project}/...`.
pub fn parse_page_url(page_url: &str) -> Option<PageLocation> {
    let url = Url::parse(page_url).ok()?;
    let host = url.host_str()?.to_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if host == "dev.azure.com" {
        let organization = segments.first().map(|s| decoded(s))?;
        return Some(PageLocation {
            organization,
            project: project_segment(segments.get(1).copied()),
            shape: HostShape::PathEmbedded,
        });
    }

    let organization = host.strip_suffix(".visualstudio.com")?;
    if organization.is_empty() || organization.contains('.') {
        return None;
    }
    let mut rest = segments.as_slice();
    if rest.first().is_some_and(|s| s.eq_ignore_ascii_case(DEFAULT_COLLECTION)) {
        rest = &rest[1..];
    }
    Some(PageLocation {
        organization: organization.to_string(),
        project: project_segment(rest.first().copied()),
        shape: HostShape::Subdomain,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Explicit context fields win; the page URL fills in the rest. `None` when
/// organization or project stays unknown.
pub fn resolve_target(context: &TranslationContext) -> Option<ProjectTarget> {
    let page = context.page_url.as_deref().and_then(parse_page_url);
    let organization = non_blank(context.organization.as_deref())
        .or_else(|| page.as_ref().map(|p| p.organization.clone()))?;
    let project = non_blank(context.project.as_deref())
        .or_else(|| page.as_ref().and_then(|p| p.project.clone()))?;
    let shape = context
        .host_shape
        .or_else(|| page.as_ref().map(|p| p.shape))
        .unwrap_or_default();
    Some(ProjectTarget::new(organization, project, shape))
}

/// Base every query URL hangs off: `{project root}/_queries/query/`.
pub fn query_base(context: &TranslationContext) -> Option<String> {
    resolve_target(context).map(|target| format!("{}/_queries/query/", target.project_root()))
}
