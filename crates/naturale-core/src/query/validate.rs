//! Structural checks for compiled query strings and query URLs.

use url::Url;

use crate::errors::{NaturaleError, NaturaleResult};

fn finish(problems: Vec<String>) -> NaturaleResult<()> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(NaturaleError::Validation(problems))
    }
}

/// Collect every structural problem in `wiql` rather than stopping at the
/// first one.
pub fn wiql_problems(wiql: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let trimmed = wiql.trim();
    if trimmed.is_empty() {
        problems.push("Query is empty".to_string());
        return problems;
    }

    let upper = trimmed.to_uppercase();
    if !upper.starts_with("SELECT ") {
        problems.push("Missing SELECT clause".to_string());
    }
    if !upper.contains(" FROM WORKITEMS") {
        problems.push("Missing FROM WorkItems clause".to_string());
    }

    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut unbalanced = false;
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        if in_string {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                } else {
                    in_string = false;
                }
            }
            continue;
        }
        match c {
            '\'' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth < 0 {
                    unbalanced = true;
                    depth = 0;
                }
            }
            _ => {}
        }
    }
    if unbalanced || depth != 0 {
        problems.push("Unbalanced field brackets".to_string());
    }
    if in_string {
        problems.push("Unterminated string literal".to_string());
    }
    problems
}

pub fn validate_wiql(wiql: &str) -> NaturaleResult<()> {
    finish(wiql_problems(wiql))
}

fn is_supported_host(host: &str) -> bool {
    host == "dev.azure.com"
        || host
            .strip_suffix(".visualstudio.com")
            .is_some_and(|org| !org.is_empty() && !org.contains('.'))
}

/// A query URL must point at a backend query page and carry a `wiql`
/// parameter that itself validates.
pub fn validate_query_url(candidate: &str) -> NaturaleResult<()> {
    let url = match Url::parse(candidate.trim()) {
        Ok(url) => url,
        Err(err) => return finish(vec![format!("Invalid URL: {err}")]),
    };

    let mut problems = Vec::new();
    let host = url.host_str().unwrap_or_default().to_lowercase();
    if !is_supported_host(&host) {
        problems.push(format!("Unsupported host: {host}"));
    }
    if !url.path().contains("/_queries/query") {
        problems.push("Missing _queries/query path".to_string());
    }
    match url.query_pairs().find(|(key, _)| key == "wiql") {
        Some((_, wiql)) => problems.extend(wiql_problems(&wiql)),
        None => problems.push("Missing wiql parameter".to_string()),
    }
    finish(problems)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_wiql() {
        let wiql = "SELECT [System.Id] FROM WorkItems WHERE [System.Title] CONTAINS 'it''s [odd'";
        assert!(validate_wiql(wiql).is_ok());
    }

    #[test]
    fn test_wiql_problems_are_collected() {
        assert_eq!(wiql_problems("  "), vec!["Query is empty"]);
        let problems = wiql_problems("SELECT [System.Id FROM Bugs WHERE [System.Title] = 'x");
        assert!(problems.contains(&"Missing FROM WorkItems clause".to_string()));
        assert!(problems.contains(&"Unbalanced field brackets".to_string()));
        assert!(problems.contains(&"Unterminated string literal".to_string()));
        assert!(wiql_problems("SELECT ]System.Id[ FROM WorkItems")
            .contains(&"Unbalanced field brackets".to_string()));
    }

    #[test]
    fn test_validation_error_message_joins_problems() {
        let err = validate_wiql("DELETE everything").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: Missing SELECT clause; Missing FROM WorkItems clause"
        );
    }

    #[test]
    fn test_validate_query_url() {
        let good = "https://dev.azure.com/acme/web/_queries/query/?wiql=SELECT%20%5BSystem.Id%5D%20FROM%20WorkItems";
        assert!(validate_query_url(good).is_ok());
        let subdomain = "https://acme.visualstudio.com/web/_queries/query/?wiql=SELECT%20%5BSystem.Id%5D%20FROM%20WorkItems";
        assert!(validate_query_url(subdomain).is_ok());
    }

    #[test]
    fn test_validate_query_url_rejects_foreign_or_incomplete() {
        assert!(validate_query_url("https://example.com").is_err());
        assert!(validate_query_url("not a url").is_err());
        assert!(validate_query_url("https://dev.azure.com/acme/web/_queries/query/").is_err());
        assert!(validate_query_url("https://dev.azure.com/acme/web/_boards?wiql=SELECT%20x%20FROM%20WorkItems").is_err());
    }
}
