//! Rule-to-endpoint mapping by keyword overlap

use crate::contract::Endpoint;
use crate::requirements::BusinessRule;
use tracing::debug;

/// Link each rule to every endpoint whose vocabulary appears in its description
///
/// An endpoint matches when its summary, operation id, any tag, or any
/// literal (non-`{param}`) path segment occurs case-insensitively in the
/// rule description. Endpoints are added at most once per rule.
pub fn map_rules_to_endpoints(mut rules: Vec<BusinessRule>, endpoints: &[Endpoint]) -> Vec<BusinessRule> {
    for rule in &mut rules {
        let description = rule.description.to_lowercase();
        for endpoint in endpoints {
            if !matches(&description, endpoint) {
                continue;
            }
            let key = endpoint.key();
            if !rule.related_endpoints.contains(&key) {
                rule.related_endpoints.push(key);
            }
        }
    }
    debug!(
        mapped = rules.iter().filter(|r| !r.related_endpoints.is_empty()).count(),
        total = rules.len(),
        "mapped rules to endpoints"
    );
    rules
}

fn matches(description: &str, endpoint: &Endpoint) -> bool {
    let occurs = |needle: &str| {
        let needle = needle.trim().to_lowercase();
        !needle.is_empty() && description.contains(&needle)
    };

    endpoint.summary.as_deref().is_some_and(occurs)
        || endpoint.operation_id.as_deref().is_some_and(occurs)
        || endpoint.tags.iter().any(|tag| occurs(tag))
        || literal_segments(&endpoint.path).any(occurs)
}

fn literal_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !(segment.starts_with('{') && segment.ends_with('}')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::EndpointKey;

    fn endpoint(method: &str, path: &str, summary: Option<&str>, tags: &[&str]) -> Endpoint {
        let mut e = Endpoint::new(method, path);
        e.summary = summary.map(str::to_string);
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        e
    }

    #[test]
    fn test_maps_by_path_segment_and_summary() {
        let rules = vec![
            BusinessRule::new("R-1", "Orders", "Orders must not exceed 100 items"),
            BusinessRule::new("R-2", "Misc", "Create Invoice should be idempotent"),
            BusinessRule::new("R-3", "Misc", "Nothing relevant must happen"),
        ];
        let endpoints = vec![
            endpoint("GET", "/orders/{id}", None, &[]),
            endpoint("POST", "/invoices", Some("Create invoice"), &[]),
        ];

        let mapped = map_rules_to_endpoints(rules, &endpoints);
        assert_eq!(mapped[0].related_endpoints, vec![EndpointKey::new("GET", "/orders/{id}")]);
        assert_eq!(mapped[1].related_endpoints, vec![EndpointKey::new("POST", "/invoices")]);
        assert!(mapped[2].related_endpoints.is_empty());
    }

    #[test]
    fn test_multiple_conditions_add_endpoint_once() {
        let rules = vec![BusinessRule::new("R-1", "s", "payments rule: list payments via listPayments")];
        let mut e = endpoint("GET", "/payments", Some("payments"), &["payments"]);
        e.operation_id = Some("listPayments".into());

        let mapped = map_rules_to_endpoints(rules, &[e]);
        assert_eq!(mapped[0].related_endpoints.len(), 1);
    }

    #[test]
    fn test_parameter_segments_and_empty_summary_ignored() {
        let rules = vec![BusinessRule::new("R-1", "s", "the {id} must be numeric")];
        let e = endpoint("GET", "/{id}", Some("  "), &[]);
        let mapped = map_rules_to_endpoints(rules, &[e]);
        assert!(mapped[0].related_endpoints.is_empty());
    }
}
