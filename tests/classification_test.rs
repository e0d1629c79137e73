//! Data-driven tests for the keyword heuristics and ordering policies

use covgap::gaps::method_rank;
use covgap::trace::path_from_url;
use covgap::*;
use rstest::rstest;

// ============================================================================
// Rule heuristics
// ============================================================================

#[rstest]
#[case("Login requires auth tokens", RuleCategory::Security)]
#[case("Security headers are mandatory", RuleCategory::Security)]
#[case("A transaction is reversible for 24h", RuleCategory::Payment)]
#[case("Payment methods are stored", RuleCategory::Payment)]
#[case("Account names are unique", RuleCategory::User)]
#[case("Each user has one profile", RuleCategory::User)]
#[case("Prices are shown in EUR", RuleCategory::General)]
#[case("Usernames are unique", RuleCategory::User)]
// keywords match at word start only
#[case("Reauthorization is logged", RuleCategory::General)]
// first matching group wins
#[case("Authenticated payment by user", RuleCategory::Security)]
#[case("Payments are authorised upfront", RuleCategory::Security)]
fn test_rule_category(#[case] text: &str, #[case] expected: RuleCategory) {
    assert_eq!(RuleCategory::classify(text), expected, "{}", text);
}

#[rstest]
#[case("This is critical", RulePriority::High)]
#[case("Orders MUST be confirmed", RulePriority::High)]
#[case("Responses should be cached", RulePriority::Medium)]
#[case("Pagination is recommended", RulePriority::Medium)]
#[case("Clients may retry", RulePriority::Low)]
#[case("An optional note", RulePriority::Low)]
#[case("Plain statement", RulePriority::Medium)]
#[case("No dismay here", RulePriority::Medium)]
#[case("Optionally retried", RulePriority::Low)]
// both High and Low keywords: High is checked first
#[case("Fields must be optional", RulePriority::High)]
fn test_rule_priority(#[case] text: &str, #[case] expected: RulePriority) {
    assert_eq!(RulePriority::classify(text), expected, "{}", text);
}

// ============================================================================
// Ordering policies
// ============================================================================

#[rstest]
#[case("POST", 0)]
#[case("put", 1)]
#[case("DELETE", 2)]
#[case("GET", 3)]
#[case("PATCH", 4)]
#[case("HEAD", 5)]
#[case("OPTIONS", 6)]
#[case("TRACE", 99)]
fn test_method_rank(#[case] method: &str, #[case] expected: usize) {
    assert_eq!(method_rank(method), expected);
}

#[rstest]
#[case("LINE", Some(CoverageMetricKind::Line))]
#[case("BRANCH", Some(CoverageMetricKind::Branch))]
#[case("METHOD", Some(CoverageMetricKind::Method))]
#[case("INSTRUCTION", Some(CoverageMetricKind::Instruction))]
#[case("CLASS", Some(CoverageMetricKind::Class))]
#[case("COMPLEXITY", None)]
fn test_counter_types(#[case] raw: &str, #[case] expected: Option<CoverageMetricKind>) {
    assert_eq!(CoverageMetricKind::from_counter_type(raw), expected);
}

// ============================================================================
// Trace details
// ============================================================================

#[rstest]
#[case("http://localhost:8080/orders/1?x=y", Some("/orders/1"))]
#[case("https://api.example.com", Some("/"))]
#[case("/relative/path?q=1", Some("/relative/path"))]
#[case("", None)]
fn test_path_from_url(#[case] url: &str, #[case] expected: Option<&str>) {
    assert_eq!(path_from_url(url).as_deref(), expected);
}

#[rstest]
#[case(vec!["passed", "passed"], ExecutionStatus::Passed)]
#[case(vec!["passed", "skipped"], ExecutionStatus::Passed)]
#[case(vec!["skipped", "skipped"], ExecutionStatus::Skipped)]
#[case(vec!["skipped", "failed"], ExecutionStatus::Failed)]
#[case(vec!["passed", "undefined"], ExecutionStatus::Passed)]
fn test_scenario_status_precedence(#[case] statuses: Vec<&str>, #[case] expected: ExecutionStatus) {
    let steps: Vec<String> = statuses
        .iter()
        .map(|s| format!(r#"{{"name": "step", "result": {{"status": "{}"}}}}"#, s))
        .collect();
    let json = format!(
        r#"{{"name": "f", "elements": [{{"name": "s", "steps": [{}]}}]}}"#,
        steps.join(",")
    );
    let trace = parse_execution_report(&normalize(&json).unwrap());
    assert_eq!(trace.features[0].scenarios[0].status, expected);
}
