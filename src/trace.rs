//! Execution trace parsing: BDD feature/scenario/step results and the
//! HTTP traffic they produced
//!
//! Accepts both the Cucumber-style `features → elements → steps` layout and
//! the `feature → scenarios → steps` layout, where a step's HTTP exchange may
//! sit directly on the step or under `match.arguments[].request` and
//! `result.response`.

use crate::contract::{Endpoint, EndpointKey};
use crate::error::{Diagnostic, DiagnosticSource};
use crate::normalize::{Field, Node};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use tracing::debug;

const FEATURES: Field = Field::new(&["features", "feature", "items"]);
const SCENARIOS: Field = Field::new(&["elements", "scenarios", "scenarioResults"]);
const STEPS: Field = Field::new(&["steps", "stepResults"]);
const NAME: Field = Field::new(&["name", "title"]);
const DURATION: Field = Field::new(&["durationMillis", "duration", "millis"]);
const RESPONSE_STATUS: Field = Field::new(&["status", "statusCode"]);

/// Everything after the authority of an absolute URL
static URL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://[^/?#]*(/[^?#]*)?").expect("static regex")
});

/// Outcome of a step or scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Passed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("failed") => ExecutionStatus::Failed,
            Some("skipped") | Some("pending") | Some("undefined") => ExecutionStatus::Skipped,
            _ => ExecutionStatus::Passed,
        }
    }

    /// failed beats all-skipped beats passed
    pub fn of_scenario(steps: &[StepResult]) -> Self {
        if steps.iter().any(|s| s.status == ExecutionStatus::Failed) {
            ExecutionStatus::Failed
        } else if steps.iter().all(|s| s.status == ExecutionStatus::Skipped) {
            ExecutionStatus::Skipped
        } else {
            ExecutionStatus::Passed
        }
    }
}

/// One HTTP request/response observed during a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HttpExchange {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl HttpExchange {
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(&self.method, &self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StepResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub name: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpExchange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioResult {
    pub name: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub steps: Vec<StepResult>,
}

impl ScenarioResult {
    pub fn duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub scenarios: Vec<ScenarioResult>,
}

/// Roll-up counts over a whole trace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TraceTotals {
    pub features: usize,
    pub scenarios: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub steps: usize,
    pub duration_ms: u64,
}

/// A parsed execution report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Trace {
    pub features: Vec<FeatureResult>,
    pub totals: TraceTotals,
}

/// Per-endpoint verdict after combining trace and contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EndpointCoverageRecord {
    pub path: String,
    pub method: String,
    pub covered: bool,
    pub scenario_count: usize,
    pub scenarios: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub status_codes: BTreeSet<u16>,
}

impl EndpointCoverageRecord {
    fn uncovered(key: &EndpointKey) -> Self {
        Self {
            path: key.path.clone(),
            method: key.method.clone(),
            covered: false,
            scenario_count: 0,
            scenarios: BTreeSet::new(),
            status_codes: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(&self.method, &self.path)
    }
}

/// Endpoint records keyed by `METHOD:path`, kept in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointCoverage {
    records: Vec<EndpointCoverageRecord>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl EndpointCoverage {
    pub fn get(&self, key: &EndpointKey) -> Option<&EndpointCoverageRecord> {
        self.index.get(&key.id()).map(|&slot| &self.records[slot])
    }

    pub fn is_covered(&self, key: &EndpointKey) -> bool {
        self.get(key).is_some_and(|r| r.covered)
    }

    pub fn records(&self) -> &[EndpointCoverageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EndpointCoverageRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn entry(&mut self, key: &EndpointKey) -> &mut EndpointCoverageRecord {
        let id = key.id();
        let slot = match self.index.get(&id) {
            Some(&slot) => slot,
            None => {
                self.records.push(EndpointCoverageRecord::uncovered(key));
                self.index.insert(id, self.records.len() - 1);
                self.records.len() - 1
            }
        };
        &mut self.records[slot]
    }

    /// Record a hit; the same scenario counts at most once per endpoint
    pub fn record_hit(&mut self, key: &EndpointKey, scenario: &str, status: Option<u16>) {
        let record = self.entry(key);
        record.covered = true;
        if record.scenarios.insert(scenario.to_string()) {
            record.scenario_count += 1;
        }
        if let Some(status) = status {
            record.status_codes.insert(status);
        }
    }

    /// Union with the contract: every declared endpoint gets a verdict
    ///
    /// Declared endpoints never hit by the trace are added as uncovered;
    /// trace-only endpoints stay as they are.
    pub fn reconcile(mut self, endpoints: &[Endpoint]) -> Self {
        for endpoint in endpoints {
            self.entry(&endpoint.key());
        }
        debug!(records = self.records.len(), "reconciled endpoint coverage");
        self
    }
}

impl Trace {
    /// Collect every HTTP exchange into an endpoint coverage map
    pub fn endpoint_coverage(&self) -> EndpointCoverage {
        let mut coverage = EndpointCoverage::default();
        for feature in &self.features {
            for scenario in &feature.scenarios {
                for step in &scenario.steps {
                    for exchange in &step.http {
                        coverage.record_hit(&exchange.key(), &scenario.name, exchange.status);
                    }
                }
            }
        }
        coverage
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.features.iter().flat_map(|f| f.scenarios.iter())
    }
}

/// Reconcile a trace-derived map with the canonical endpoint list
pub fn reconcile(coverage: EndpointCoverage, endpoints: &[Endpoint]) -> EndpointCoverage {
    coverage.reconcile(endpoints)
}

/// Parses normalized execution reports into a [`Trace`]
#[derive(Debug, Default)]
pub struct TraceParser {
    diagnostics: Vec<Diagnostic>,
}

/// Parse an execution report, discarding diagnostics
pub fn parse_execution_report(report: &Node) -> Trace {
    TraceParser::new().parse(report)
}

impl TraceParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn parse(&mut self, report: &Node) -> Trace {
        // A bare feature object at the root is a one-feature report
        let features: Vec<&Node> = if report.lookup(&FEATURES).is_empty()
            && !report.lookup(&SCENARIOS).is_empty()
        {
            vec![report]
        } else {
            report.lookup(&FEATURES).iter().collect()
        };

        let features: Vec<FeatureResult> = features.into_iter().map(|f| self.feature(f)).collect();
        let totals = totals(&features);
        debug!(
            features = totals.features,
            scenarios = totals.scenarios,
            failed = totals.failed,
            "parsed execution trace"
        );
        Trace { features, totals }
    }

    fn feature(&mut self, node: &Node) -> FeatureResult {
        FeatureResult {
            name: node.lookup_value(&NAME).unwrap_or_default().to_string(),
            uri: node.value("uri").map(str::to_string),
            scenarios: node
                .lookup(&SCENARIOS)
                .iter()
                .map(|s| self.scenario(s))
                .collect(),
        }
    }

    fn scenario(&mut self, node: &Node) -> ScenarioResult {
        let name = node.lookup_value(&NAME).unwrap_or_default().to_string();
        let steps: Vec<StepResult> = node
            .lookup(&STEPS)
            .iter()
            .map(|s| self.step(s, &name))
            .collect();
        let tags = node
            .attr("tags")
            .into_iter()
            .chain(
                node.children("tags")
                    .iter()
                    .filter_map(|t| t.value("name").or_else(|| t.text())),
            )
            .map(str::to_string)
            .collect();
        ScenarioResult {
            status: ExecutionStatus::of_scenario(&steps),
            name,
            tags,
            steps,
        }
    }

    fn step(&mut self, node: &Node, scenario: &str) -> StepResult {
        // Some layouts nest the step definition under `step`
        let definition = node.child("step").unwrap_or(node);
        let result = node.child("result");
        let status = result
            .and_then(|r| r.value("status"))
            .or_else(|| node.value("status"));
        let duration = result
            .and_then(|r| r.lookup_value(&DURATION))
            .or_else(|| node.lookup_value(&DURATION))
            .and_then(parse_millis)
            .unwrap_or(0);

        let name = definition
            .lookup_value(&NAME)
            .or_else(|| definition.value("text"))
            .unwrap_or_default()
            .to_string();

        StepResult {
            keyword: definition
                .value("keyword")
                .or_else(|| definition.value("prefix"))
                .map(|k| k.trim().to_string()),
            http: self.exchanges(node, scenario, &name),
            name,
            status: ExecutionStatus::from_raw(status),
            duration_ms: duration,
        }
    }

    fn exchanges(&mut self, step: &Node, scenario: &str, step_name: &str) -> Vec<HttpExchange> {
        let mut requests: Vec<&Node> = step.children("request").iter().collect();
        requests.extend(step.descend(&["match", "arguments", "request"]));

        let response = step
            .child("response")
            .or_else(|| step.descend(&["result", "response"]).into_iter().next());
        let status = response
            .and_then(|r| r.lookup_value(&RESPONSE_STATUS))
            .and_then(|s| s.trim().parse().ok());

        requests
            .into_iter()
            .filter_map(|request| self.exchange(request, status, scenario, step_name))
            .collect()
    }

    fn exchange(
        &mut self,
        request: &Node,
        status: Option<u16>,
        scenario: &str,
        step_name: &str,
    ) -> Option<HttpExchange> {
        let Some(method) = request.value("method").filter(|m| !m.trim().is_empty()) else {
            self.diagnostics.push(Diagnostic::unrecognized(
                DiagnosticSource::Trace,
                format!("request without method in step '{}' of '{}'", step_name, scenario),
            ));
            return None;
        };
        let url = request.value("url").map(str::to_string);
        let path = request
            .value("path")
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .or_else(|| url.as_deref().and_then(path_from_url));

        let Some(path) = path else {
            self.diagnostics.push(Diagnostic::unrecognized(
                DiagnosticSource::Trace,
                format!(
                    "request {} without path or usable url in step '{}' of '{}'",
                    method, step_name, scenario
                ),
            ));
            return None;
        };

        Some(HttpExchange {
            method: method.trim().to_ascii_uppercase(),
            path,
            url,
            status,
        })
    }
}

/// Path component of a request URL
pub fn path_from_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = url::Url::parse(raw) {
        if !parsed.cannot_be_a_base() {
            return Some(parsed.path().to_string());
        }
    }
    if let Some(caps) = URL_PATH.captures(raw) {
        return Some(caps.get(1).map_or("/", |m| m.as_str()).to_string());
    }
    if raw.starts_with('/') {
        let end = raw.find(['?', '#']).unwrap_or(raw.len());
        return Some(raw[..end].to_string());
    }
    None
}

fn parse_millis(raw: &str) -> Option<u64> {
    raw.trim().parse::<f64>().ok().map(|v| v.max(0.0).round() as u64)
}

fn totals(features: &[FeatureResult]) -> TraceTotals {
    let mut totals = TraceTotals {
        features: features.len(),
        ..Default::default()
    };
    for scenario in features.iter().flat_map(|f| f.scenarios.iter()) {
        totals.scenarios += 1;
        totals.steps += scenario.steps.len();
        totals.duration_ms += scenario.duration_ms();
        match scenario.status {
            ExecutionStatus::Passed => totals.passed += 1,
            ExecutionStatus::Failed => totals.failed += 1,
            ExecutionStatus::Skipped => totals.skipped += 1,
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_json;
    use pretty_assertions::assert_eq;

    fn step(status: &str) -> StepResult {
        StepResult {
            keyword: None,
            name: "s".into(),
            status: ExecutionStatus::from_raw(Some(status)),
            duration_ms: 0,
            http: Vec::new(),
        }
    }

    #[test]
    fn test_scenario_status_precedence() {
        let failed = [step("passed"), step("failed"), step("skipped")];
        assert_eq!(ExecutionStatus::of_scenario(&failed), ExecutionStatus::Failed);

        let skipped = [step("skipped"), step("pending")];
        assert_eq!(ExecutionStatus::of_scenario(&skipped), ExecutionStatus::Skipped);

        let mixed = [step("passed"), step("skipped")];
        assert_eq!(ExecutionStatus::of_scenario(&mixed), ExecutionStatus::Passed);

        assert_eq!(ExecutionStatus::of_scenario(&[]), ExecutionStatus::Skipped);
    }

    #[test]
    fn test_cucumber_layout_with_nested_match_request() {
        let report = normalize_json(
            r#"[{"name": "Orders", "uri": "orders.feature", "elements": [
                {"name": "create order", "steps": [
                    {"keyword": "When ", "name": "post order",
                     "match": {"arguments": {"request": {"method": "post", "url": "http://api.test:8080/orders?x=1"}}},
                     "result": {"status": "passed", "duration": 12.4, "response": {"statusCode": 201}}},
                    {"keyword": "Then ", "name": "post again",
                     "request": {"method": "POST", "path": "/orders"},
                     "result": {"status": "passed"}}
                ]}
            ]}]"#,
        )
        .unwrap();

        let trace = parse_execution_report(&report);
        assert_eq!(trace.totals.features, 1);
        assert_eq!(trace.totals.passed, 1);
        assert_eq!(trace.totals.duration_ms, 12);

        let step = &trace.features[0].scenarios[0].steps[0];
        assert_eq!(step.keyword.as_deref(), Some("When"));
        assert_eq!(step.http[0].path, "/orders");
        assert_eq!(step.http[0].status, Some(201));

        let coverage = trace.endpoint_coverage();
        let record = coverage.get(&EndpointKey::new("post", "/orders")).unwrap();
        assert!(record.covered);
        // two hits from the same scenario count once
        assert_eq!(record.scenario_count, 1);
        assert!(record.status_codes.contains(&201));
    }

    #[test]
    fn test_feature_scenarios_layout() {
        let report = normalize_json(
            r#"{"feature": {"name": "Users", "scenarios": [
                {"name": "a", "tags": "@smoke", "steps": {"name": "get", "status": "failed",
                  "request": {"method": "get", "url": "/users/1?full=true"}}},
                {"name": "b", "tags": [{"name": "@api"}, "@slow"], "steps": [{"name": "get", "status": "passed",
                  "request": {"method": "GET", "url": "https://x.test/users/1"}}]}
            ]}}"#,
        )
        .unwrap();

        let trace = parse_execution_report(&report);
        assert_eq!(trace.totals.failed, 1);
        assert_eq!(trace.totals.passed, 1);
        let scenarios = &trace.features[0].scenarios;
        assert_eq!(scenarios[0].tags, vec!["@smoke"]);
        assert_eq!(scenarios[1].tags, vec!["@api", "@slow"]);
        let coverage = trace.endpoint_coverage();
        let record = coverage.get(&EndpointKey::new("GET", "/users/1")).unwrap();
        assert_eq!(record.scenario_count, 2);
    }

    #[test]
    fn test_request_without_path_is_diagnosed() {
        let report = normalize_json(
            r#"{"features": [{"name": "f", "elements": [{"name": "s", "steps": [
                {"name": "x", "request": {"method": "GET"}},
                {"name": "y", "request": {"url": "/a"}}
            ]}]}]}"#,
        )
        .unwrap();
        let mut parser = TraceParser::new();
        let trace = parser.parse(&report);
        assert!(trace.endpoint_coverage().is_empty());
        assert_eq!(parser.diagnostics().len(), 2);
    }

    #[test]
    fn test_reconcile_adds_uncovered_and_keeps_trace_only() {
        let mut coverage = EndpointCoverage::default();
        coverage.record_hit(&EndpointKey::new("POST", "/orders"), "s1", None);
        coverage.record_hit(&EndpointKey::new("GET", "/health"), "s1", None);

        let contract = vec![Endpoint::new("GET", "/orders"), Endpoint::new("POST", "/orders")];
        let merged = reconcile(coverage, &contract);

        assert_eq!(merged.len(), 3);
        assert!(!merged.is_covered(&EndpointKey::new("GET", "/orders")));
        assert!(merged.is_covered(&EndpointKey::new("POST", "/orders")));
        assert!(merged.is_covered(&EndpointKey::new("GET", "/health")));
    }

    #[test]
    fn test_path_from_url() {
        assert_eq!(path_from_url("http://h:1/a/b?q=1").as_deref(), Some("/a/b"));
        assert_eq!(path_from_url("https://h").as_deref(), Some("/"));
        assert_eq!(path_from_url("/a/b#frag").as_deref(), Some("/a/b"));
        assert_eq!(path_from_url("http://{{host}}/a/b").as_deref(), Some("/a/b"));
        assert_eq!(path_from_url("not a url"), None);
    }
}
