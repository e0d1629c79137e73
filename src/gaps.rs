//! Gap classification: code, API and business-rule gaps with fixed sort orders
//!
//! | Pass          | Gap when                                   | Sorted by                 |
//! |---------------|--------------------------------------------|---------------------------|
//! | Code          | metric percentage < threshold              | LINE % ascending          |
//! | API           | endpoint record absent or uncovered        | POST PUT DELETE GET PATCH HEAD OPTIONS other |
//! | Business rule | no related endpoint is covered             | High, Medium, Low         |

use crate::contract::Endpoint;
use crate::coverage::{CoverageMetricKind, CoverageNode, CoverageTree};
use crate::requirements::BusinessRule;
use crate::trace::EndpointCoverage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const DESCRIPTION_LIMIT: usize = 100;

/// Method priority order for API gaps; unknown verbs rank last
const METHOD_ORDER: [&str; 7] = ["POST", "PUT", "DELETE", "GET", "PATCH", "HEAD", "OPTIONS"];
const UNKNOWN_METHOD_RANK: usize = 99;

/// Minimum acceptable percentage per metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ThresholdPolicy {
    pub thresholds: BTreeMap<CoverageMetricKind, u32>,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            thresholds: BTreeMap::from([
                (CoverageMetricKind::Line, 80),
                (CoverageMetricKind::Branch, 70),
                (CoverageMetricKind::Method, 80),
            ]),
        }
    }
}

impl ThresholdPolicy {
    /// All five metrics, adding INSTRUCTION 70% and CLASS 90%
    pub fn full() -> Self {
        let mut policy = Self::default();
        policy.thresholds.insert(CoverageMetricKind::Instruction, 70);
        policy.thresholds.insert(CoverageMetricKind::Class, 90);
        policy
    }

    pub fn threshold(&self, kind: CoverageMetricKind) -> Option<u32> {
        self.thresholds.get(&kind).copied()
    }

    /// Override individual thresholds, keeping the rest
    pub fn with_overrides(mut self, overrides: &BTreeMap<CoverageMetricKind, u32>) -> Self {
        for (kind, value) in overrides {
            self.thresholds.insert(*kind, (*value).min(100));
        }
        self
    }
}

/// A class or method whose metric fell below threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageGap {
    pub package: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub metric: CoverageMetricKind,
    pub coverage: u32,
    pub threshold: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_coverage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_coverage: Option<u32>,
    pub suggestion: String,
}

impl CoverageGap {
    pub fn fqcn(&self) -> String {
        if self.package.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.package, self.class_name)
        }
    }
}

/// A contract endpoint no scenario exercised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiGap {
    pub endpoint: Endpoint,
    pub covered: bool,
    pub suggestion: String,
}

/// A business rule with no covered endpoint behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BusinessRuleGap {
    pub rule: BusinessRule,
    pub covered: bool,
    pub suggestion: String,
}

/// Applies threshold and absence policies to produce the three gap lists
#[derive(Debug, Clone, Default)]
pub struct GapClassifier {
    policy: ThresholdPolicy,
}

impl GapClassifier {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// Every class and method metric strictly below its threshold
    pub fn code_gaps(&self, tree: &CoverageTree) -> Vec<CoverageGap> {
        let mut gaps = Vec::new();
        for class in tree.classes() {
            self.node_gaps(class, &mut gaps);
            for method in &class.children {
                self.node_gaps(method, &mut gaps);
            }
        }
        // stable: ties keep tree order
        gaps.sort_by_key(|gap| gap.line_coverage.unwrap_or(0));
        debug!(gaps = gaps.len(), "classified code gaps");
        gaps
    }

    fn node_gaps(&self, node: &CoverageNode, gaps: &mut Vec<CoverageGap>) {
        for (kind, threshold) in &self.policy.thresholds {
            let Some(coverage) = node.percentage(*kind) else {
                continue;
            };
            if coverage >= *threshold {
                continue;
            }
            gaps.push(CoverageGap {
                package: node.package.clone(),
                class_name: node.class_name.clone(),
                method_name: node.method_name.clone(),
                line: node.line,
                metric: *kind,
                coverage,
                threshold: *threshold,
                line_coverage: node.percentage(CoverageMetricKind::Line),
                branch_coverage: node.percentage(CoverageMetricKind::Branch),
                suggestion: code_suggestion(node, *kind, coverage),
            });
        }
    }

    /// Contract endpoints whose reconciled record is absent or uncovered
    pub fn api_gaps(&self, endpoints: &[Endpoint], coverage: &EndpointCoverage) -> Vec<ApiGap> {
        let mut gaps: Vec<ApiGap> = endpoints
            .iter()
            .filter(|endpoint| !coverage.is_covered(&endpoint.key()))
            .map(|endpoint| ApiGap {
                suggestion: api_suggestion(endpoint),
                endpoint: endpoint.clone(),
                covered: false,
            })
            .collect();
        gaps.sort_by_key(|gap| method_rank(&gap.endpoint.method));
        debug!(gaps = gaps.len(), "classified API gaps");
        gaps
    }

    /// Rules none of whose related endpoints is covered
    pub fn business_rule_gaps(
        &self,
        rules: &[BusinessRule],
        coverage: &EndpointCoverage,
    ) -> Vec<BusinessRuleGap> {
        let mut gaps: Vec<BusinessRuleGap> = rules
            .iter()
            .filter(|rule| !rule.related_endpoints.iter().any(|key| coverage.is_covered(key)))
            .map(|rule| BusinessRuleGap {
                suggestion: rule_suggestion(rule),
                rule: rule.clone(),
                covered: false,
            })
            .collect();
        gaps.sort_by_key(|gap| gap.rule.priority);
        debug!(gaps = gaps.len(), "classified business rule gaps");
        gaps
    }
}

/// Position of an HTTP method in the API gap order
pub fn method_rank(method: &str) -> usize {
    let method = method.to_ascii_uppercase();
    METHOD_ORDER
        .iter()
        .position(|m| *m == method)
        .unwrap_or(UNKNOWN_METHOD_RANK)
}

fn code_suggestion(node: &CoverageNode, kind: CoverageMetricKind, coverage: u32) -> String {
    let target = match &node.method_name {
        Some(method) => format!("method '{}' in class '{}'", method, node.class_name),
        None => format!("class '{}'", node.class_name),
    };
    let mut suggestion = format!(
        "Add tests to improve {} coverage for {} (currently {}%).",
        kind, target, coverage
    );
    let clause = match kind {
        CoverageMetricKind::Branch => Some("Ensure all conditional branches are tested."),
        CoverageMetricKind::Line => Some("Ensure all code paths are exercised."),
        CoverageMetricKind::Method => Some("Ensure method is called with various inputs."),
        _ => None,
    };
    if let Some(clause) = clause {
        suggestion.push(' ');
        suggestion.push_str(clause);
    }
    suggestion
}

fn api_suggestion(endpoint: &Endpoint) -> String {
    let mut suggestion = format!(
        "Add a test scenario for {} {}.",
        endpoint.method.to_ascii_uppercase(),
        endpoint.path
    );
    let clause = match endpoint.method.to_ascii_uppercase().as_str() {
        "GET" => Some("Test different query parameters and response codes."),
        "POST" => Some("Test with valid and invalid request payloads."),
        "PUT" => Some("Test update functionality with different payloads."),
        "DELETE" => Some("Test successful deletion and error cases."),
        _ => None,
    };
    if let Some(clause) = clause {
        suggestion.push(' ');
        suggestion.push_str(clause);
    }
    suggestion
}

fn rule_suggestion(rule: &BusinessRule) -> String {
    let mut suggestion = format!(
        "Add a test scenario for business rule {}: \"{}\" (Category: {}, Priority: {}).",
        rule.id,
        truncate(&rule.description, DESCRIPTION_LIMIT),
        rule.category,
        rule.priority
    );
    if !rule.related_endpoints.is_empty() {
        let endpoints: Vec<String> = rule.related_endpoints.iter().map(|k| k.to_string()).collect();
        suggestion.push_str(&format!(" Related endpoints: {}.", endpoints.join(", ")));
    }
    suggestion
}

/// Cut `text` to `limit` characters, marking the cut with `...`
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}...", cut)
}
