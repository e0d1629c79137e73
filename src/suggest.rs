//! Test scenario suggestions
//!
//! One [`SuggestionProvider`] seam with two implementations:
//! - [`DeterministicSynthesizer`] derives scenarios purely from gap data
//! - [`CommandSuggestionProvider`] hands the gaps to an external program
//!   (typically an LLM wrapper) over stdin/stdout

use crate::contract::Endpoint;
use crate::coverage::CoverageMetricKind;
use crate::error::{Error, Result};
use crate::gaps::{truncate, ApiGap, BusinessRuleGap, CoverageGap};
use crate::requirements::BusinessRule;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A suggested test scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestScenario {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub expected_results: Vec<String>,
}

fn default_priority() -> String {
    "Medium".to_string()
}

/// Everything a provider may use to phrase suggestions
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest<'a> {
    pub code_gaps: &'a [CoverageGap],
    pub api_gaps: &'a [ApiGap],
    pub business_rule_gaps: &'a [BusinessRuleGap],
    pub endpoint_catalog: &'a [Endpoint],
    pub rule_catalog: &'a [BusinessRule],
}

/// Source of scenario suggestions
pub trait SuggestionProvider: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, request: &SuggestionRequest<'_>) -> Result<Vec<TestScenario>>;
}

/// Rule-based scenarios derived directly from gaps
#[derive(Debug, Clone, Default)]
pub struct DeterministicSynthesizer;

impl SuggestionProvider for DeterministicSynthesizer {
    fn name(&self) -> &str {
        "deterministic"
    }

    fn generate(&self, request: &SuggestionRequest<'_>) -> Result<Vec<TestScenario>> {
        let mut scenarios = synthesize_code_scenarios(request.code_gaps);
        scenarios.extend(synthesize_api_scenarios(request.api_gaps));
        scenarios.extend(synthesize_rule_scenarios(request.business_rule_gaps));
        debug!(scenarios = scenarios.len(), "synthesized scenarios");
        Ok(scenarios)
    }
}

/// Gaps of one class, split by method in first-seen order
struct ClassGroup<'a> {
    fqcn: String,
    class_name: &'a str,
    class_gaps: Vec<&'a CoverageGap>,
    methods: Vec<(&'a str, Vec<&'a CoverageGap>)>,
}

fn group_by_class(gaps: &[CoverageGap]) -> Vec<ClassGroup<'_>> {
    let mut groups: Vec<ClassGroup<'_>> = Vec::new();
    for gap in gaps {
        let fqcn = gap.fqcn();
        let slot = match groups.iter().position(|g| g.fqcn == fqcn) {
            Some(slot) => slot,
            None => {
                groups.push(ClassGroup {
                    fqcn,
                    class_name: &gap.class_name,
                    class_gaps: Vec::new(),
                    methods: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[slot];
        match gap.method_name.as_deref() {
            Some(method) => match group.methods.iter_mut().find(|(m, _)| *m == method) {
                Some((_, method_gaps)) => method_gaps.push(gap),
                None => group.methods.push((method, vec![gap])),
            },
            None => group.class_gaps.push(gap),
        }
    }
    groups
}

/// One scenario per method with gaps; one per class with only class-level gaps
pub fn synthesize_code_scenarios(gaps: &[CoverageGap]) -> Vec<TestScenario> {
    let mut scenarios = Vec::new();
    for group in group_by_class(gaps) {
        if group.methods.is_empty() {
            let id = format!("TS-GAP-{}", scenarios.len() + 1);
            scenarios.push(class_scenario(id, &group));
            continue;
        }
        for (method, method_gaps) in &group.methods {
            let id = format!("TS-GAP-{}", scenarios.len() + 1);
            scenarios.push(method_scenario(id, &group, method, method_gaps));
        }
    }
    scenarios
}

fn method_scenario(id: String, group: &ClassGroup<'_>, method: &str, gaps: &[&CoverageGap]) -> TestScenario {
    let has = |kind: CoverageMetricKind| gaps.iter().any(|g| g.metric == kind);
    let mut steps = vec![format!("Initialize test data for {}", method)];
    let mut expected_results = Vec::new();

    if has(CoverageMetricKind::Branch) {
        steps.push(format!("Call {} with inputs that trigger branch A", method));
        steps.push(format!("Call {} with inputs that trigger branch B", method));
        expected_results.push("All branches of the method are executed".to_string());
    } else {
        steps.push(format!("Call {} with representative inputs", method));
    }
    if has(CoverageMetricKind::Line) {
        expected_results.push("All lines of the method are executed".to_string());
    }
    expected_results.push(format!("{} returns expected result", method));

    TestScenario {
        id,
        title: format!("Cover {}.{}", group.class_name, method),
        description: format!(
            "Improve coverage of {} in {}: {}",
            method,
            group.fqcn,
            describe_gaps(gaps)
        ),
        priority: scenario_priority(gaps).to_string(),
        requirements: vec![format!("{}#{}", group.fqcn, method)],
        steps,
        expected_results,
    }
}

fn class_scenario(id: String, group: &ClassGroup<'_>) -> TestScenario {
    let class_name = group.class_name;
    TestScenario {
        id,
        title: format!("Cover {}", class_name),
        description: format!(
            "Improve coverage of class {}: {}",
            group.fqcn,
            describe_gaps(&group.class_gaps)
        ),
        priority: scenario_priority(&group.class_gaps).to_string(),
        requirements: vec![group.fqcn.clone()],
        steps: vec![
            format!("Initialize test data for {}", class_name),
            format!("Exercise each public method of {}", class_name),
        ],
        expected_results: vec![
            format!("All methods of {} are executed", class_name),
            format!("{} behaves as specified", class_name),
        ],
    }
}

fn describe_gaps(gaps: &[&CoverageGap]) -> String {
    gaps.iter()
        .map(|g| format!("{} {}% < {}%", g.metric, g.coverage, g.threshold))
        .collect::<Vec<_>>()
        .join(", ")
}

fn scenario_priority(gaps: &[&CoverageGap]) -> &'static str {
    if gaps.iter().any(|g| g.coverage < 50) {
        "High"
    } else {
        "Medium"
    }
}

/// One scenario per uncovered endpoint
pub fn synthesize_api_scenarios(gaps: &[ApiGap]) -> Vec<TestScenario> {
    gaps.iter()
        .enumerate()
        .map(|(i, gap)| {
            let endpoint = &gap.endpoint;
            let key = endpoint.key();
            let label = endpoint
                .summary
                .clone()
                .unwrap_or_else(|| key.to_string());
            let mut steps = vec![format!("Prepare a request for {}", key)];
            steps.extend(endpoint.parameters.iter().filter(|p| p.required).map(|p| {
                format!("Provide required {} parameter '{}'", p.location, p.name)
            }));
            steps.push(format!("Send {} request", key));
            let mut expected_results: Vec<String> = endpoint
                .responses
                .iter()
                .map(|r| format!("Response status {} is returned when expected", r.status))
                .collect();
            if expected_results.is_empty() {
                expected_results.push("A successful response is returned".to_string());
            }
            TestScenario {
                id: format!("TS-API-{}", i + 1),
                title: format!("Exercise {}", label),
                description: gap.suggestion.clone(),
                priority: if matches!(key.method.as_str(), "POST" | "PUT" | "DELETE") {
                    "High".to_string()
                } else {
                    "Medium".to_string()
                },
                requirements: vec![key.to_string()],
                steps,
                expected_results,
            }
        })
        .collect()
}

/// One scenario per uncovered business rule
pub fn synthesize_rule_scenarios(gaps: &[BusinessRuleGap]) -> Vec<TestScenario> {
    gaps.iter()
        .enumerate()
        .map(|(i, gap)| {
            let rule = &gap.rule;
            let mut steps = vec![format!("Set up data for rule {} ({})", rule.id, rule.section)];
            if rule.related_endpoints.is_empty() {
                steps.push("Exercise the behaviour described by the rule".to_string());
            } else {
                steps.extend(
                    rule.related_endpoints
                        .iter()
                        .map(|key| format!("Call {} in a way that exercises the rule", key)),
                );
            }
            steps.push("Repeat with inputs that violate the rule".to_string());
            TestScenario {
                id: format!("TS-RULE-{}", i + 1),
                title: format!("Verify {}: {}", rule.id, truncate(&rule.description, 60)),
                description: rule.description.clone(),
                priority: rule.priority.to_string(),
                requirements: vec![rule.id.clone()],
                steps,
                expected_results: vec![
                    "Valid inputs are accepted".to_string(),
                    "Violations are rejected with a clear error".to_string(),
                ],
            }
        })
        .collect()
}

/// Delegates suggestion phrasing to an external program
///
/// The request is written to the program's stdin as JSON; stdout must hold
/// a scenario array, optionally wrapped in an object or a Markdown fence.
#[derive(Debug, Clone)]
pub struct CommandSuggestionProvider {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSuggestionProvider {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn run(&self, input: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Collaborator(format!("cannot start '{}': {}", self.program, e)))?;

        // Drain stdout on a helper thread so a chatty child cannot block on a full pipe
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Collaborator("stdout not captured".into()))?;
        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = sender.send(stdout.read_to_string(&mut buf).map(|_| buf));
        });

        // Write on its own thread too; a child that never reads stdin must still time out
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Collaborator("stdin not captured".into()))?;
        let input = input.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let started = Instant::now();
        let status = loop {
            let exited = child
                .try_wait()
                .map_err(|e| Error::Collaborator(format!("cannot wait for '{}': {}", self.program, e)))?;
            if let Some(status) = exited {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.timed_out());
            }
            std::thread::sleep(Duration::from_millis(25));
        };

        // Background processes may inherit stdout; the deadline still covers the read
        let remaining = self.timeout.saturating_sub(started.elapsed());
        let output = match receiver.recv_timeout(remaining) {
            Ok(read) => read.map_err(|e| Error::Collaborator(format!("cannot read response: {}", e)))?,
            Err(RecvTimeoutError::Timeout) => return Err(self.timed_out()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Collaborator("stdout reader panicked".into()))
            }
        };
        if writer.is_finished() {
            if let Ok(Err(e)) = writer.join() {
                debug!(error = %e, "suggestion program closed stdin early");
            }
        }

        if !status.success() {
            return Err(Error::Collaborator(format!(
                "'{}' exited with {}",
                self.program, status
            )));
        }
        Ok(output)
    }

    fn timed_out(&self) -> Error {
        Error::Collaborator(format!("'{}' timed out after {:?}", self.program, self.timeout))
    }
}

impl SuggestionProvider for CommandSuggestionProvider {
    fn name(&self) -> &str {
        &self.program
    }

    fn generate(&self, request: &SuggestionRequest<'_>) -> Result<Vec<TestScenario>> {
        let input = serde_json::to_vec(request)?;
        info!(program = %self.program, "requesting scenario suggestions");
        let output = self.run(&input)?;
        parse_scenarios(&output)
    }
}

#[derive(Deserialize)]
struct ScenarioEnvelope {
    scenarios: Vec<TestScenario>,
}

/// Parse a collaborator response into scenarios
///
/// Accepts a bare array, `{"scenarios": [...]}`, or either inside a
/// Markdown code fence.
pub fn parse_scenarios(response: &str) -> Result<Vec<TestScenario>> {
    let body = strip_code_fence(response.trim());
    if let Ok(scenarios) = serde_json::from_str::<Vec<TestScenario>>(body) {
        return Ok(scenarios);
    }
    if let Ok(envelope) = serde_json::from_str::<ScenarioEnvelope>(body) {
        return Ok(envelope.scenarios);
    }
    Err(Error::Collaborator(format!(
        "unparseable suggestion response: {}",
        truncate(body, 80)
    )))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // skip the info string (```json)
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}
