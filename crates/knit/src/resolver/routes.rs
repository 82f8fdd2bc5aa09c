//! Cross-domain matching of HTTP requests to route definitions.
//!
//! An `ApiFetch` proposal names a URL as the client wrote it; routes declare
//! path patterns in their framework's syntax. Both sides are reduced to
//! segment lists and compared segment by segment.
//!
//! | Route segment | Matches |
//! |---------------|---------|
//! | `users` | exactly `users`, or a dynamic client segment |
//! | `:id`, `{id}`, `[id]`, `<id>` | any one segment |
//! | trailing `*`, `**`, `[...slug]` | the rest of the path |
//!
//! Client segments like `${id}`, `{id}` or `:id` are dynamic and match any
//! route segment. A route with more literal matches outranks one that
//! matched through parameters.

use super::Outcome;
use super::index::ResolutionIndex;
use crate::diagnostics::{Diagnostic, ResolutionScope};
use crate::ir::{Element, PotentialRelationship};
use crate::types::{HTTP_METHOD, PATH_PATTERN, RelationshipKind};

/// Route methods that accept any request method.
const ANY_METHODS: &[&str] = &["ALL", "ANY", "*"];

/// Reduce a URL to its path: scheme, host, query, fragment and trailing
/// slash are dropped and the result always starts with `/`.
///
/// ```
/// use knit::resolver::normalize_url;
///
/// assert_eq!(normalize_url("https://api.example.com/v1/users/?page=2"), "/v1/users");
/// assert_eq!(normalize_url("api/data#top"), "/api/data");
/// assert_eq!(normalize_url(""), "/");
/// ```
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let mut s = raw.trim().trim_matches(['"', '\'', '`']);
    if let Some(pos) = s.find("://") {
        let rest = &s[pos + 3..];
        s = rest.find('/').map_or("", |i| &rest[i..]);
    }
    if let Some(end) = s.find(['?', '#']) {
        s = &s[..end];
    }
    let segments: Vec<&str> = s.split('/').filter(|seg| !seg.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn wrapped(seg: &str, open: char, close: char) -> bool {
    seg.len() >= 2 && seg.starts_with(open) && seg.ends_with(close)
}

fn is_route_wildcard(seg: &str) -> bool {
    seg == "*" || seg == "**" || seg.starts_with("[...") || seg.starts_with("[[...")
        || (seg.starts_with('*') && seg.len() > 1)
}

fn is_route_param(seg: &str) -> bool {
    seg.starts_with(':')
        || wrapped(seg, '{', '}')
        || wrapped(seg, '[', ']')
        || wrapped(seg, '<', '>')
}

fn is_dynamic(seg: &str) -> bool {
    seg.contains("${") || wrapped(seg, '{', '}') || seg.starts_with(':')
}

/// How well a route matched; greater is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MatchScore {
    literal_segments: usize,
    exact_length: bool,
}

fn match_score(pattern: &str, url: &str) -> Option<MatchScore> {
    let route = segments(pattern);
    let client = segments(url);
    let mut literal_segments = 0;

    for (i, seg) in route.iter().enumerate() {
        if is_route_wildcard(seg) && i + 1 == route.len() {
            return Some(MatchScore {
                literal_segments,
                exact_length: false,
            });
        }
        let actual = client.get(i)?;
        if is_route_param(seg) || is_dynamic(actual) {
            continue;
        }
        if seg != actual {
            return None;
        }
        literal_segments += 1;
    }

    (route.len() == client.len()).then_some(MatchScore {
        literal_segments,
        exact_length: true,
    })
}

/// Returns `true` if a request to `url` would be served by a route declared
/// with `pattern`.
///
/// ```
/// use knit::resolver::route_matches;
///
/// assert!(route_matches("/api/users/:id", "/api/users/42"));
/// assert!(route_matches("/api/users/{id}", "/api/users/${user.id}"));
/// assert!(route_matches("/static/*", "/static/css/site.css"));
/// assert!(!route_matches("/api/users/:id", "/api/users"));
/// ```
#[must_use]
pub fn route_matches(pattern: &str, url: &str) -> bool {
    match_score(&normalize_url(pattern), &normalize_url(url)).is_some()
}

fn methods_compatible(route_method: Option<&str>, fetch_method: Option<&str>) -> bool {
    match (route_method, fetch_method) {
        (Some(r), Some(f)) => {
            ANY_METHODS.iter().any(|any| r.eq_ignore_ascii_case(any)) || r.eq_ignore_ascii_case(f)
        }
        _ => true,
    }
}

fn route_pattern(route: &Element) -> Option<&str> {
    route.property_str(PATH_PATTERN).or_else(|| {
        route
            .id
            .scope_path()
            .and_then(|scope| scope.split_once(':'))
            .map(|(_, pattern)| pattern)
    })
}

/// Best-scoring routes for `url`, in tie-break order.
fn best_routes<'a>(
    index: &ResolutionIndex<'a>,
    url: &str,
    method: Option<&str>,
) -> Vec<&'a Element> {
    let scored: Vec<(MatchScore, &'a Element)> = index
        .routes()
        .filter(|route| {
            methods_compatible(
                route.property_str(HTTP_METHOD).filter(|m| !m.is_empty()),
                method,
            )
        })
        .filter_map(|route| {
            let pattern = normalize_url(route_pattern(route)?);
            match_score(&pattern, url).map(|score| (score, route))
        })
        .collect();

    let Some(best) = scored.iter().map(|(score, _)| *score).max() else {
        return Vec::new();
    };
    scored
        .into_iter()
        .filter(|(score, _)| *score == best)
        .map(|(_, route)| route)
        .collect()
}

/// The URL without a leading dynamic base (`${API_BASE}/users` → `/users`).
fn strip_dynamic_base(url: &str) -> Option<String> {
    let segs = segments(url);
    match segs.split_first() {
        Some((first, rest)) if first.contains("${") && !rest.is_empty() => {
            Some(format!("/{}", rest.join("/")))
        }
        _ => None,
    }
}

pub(super) fn resolve(
    index: &ResolutionIndex<'_>,
    relationship: &PotentialRelationship,
    out: &mut Outcome,
) {
    let url = normalize_url(&relationship.target_pattern);
    let method = relationship
        .property_str(HTTP_METHOD)
        .map(str::trim)
        .filter(|m| !m.is_empty());

    let mut hits = best_routes(index, &url, method);
    if hits.is_empty() {
        if let Some(stripped) = strip_dynamic_base(&url) {
            hits = best_routes(index, &stripped, method);
        }
    }

    if hits.is_empty() {
        out.diagnostics.push(Diagnostic::unresolvable(
            relationship,
            ResolutionScope::Routes,
            &url,
        ));
        return;
    }
    out.choose(
        relationship,
        RelationshipKind::Fetches,
        &hits,
        ResolutionScope::Routes,
        &url,
    );
}
