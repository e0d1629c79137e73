//! Single-source inspection commands: coverage, trace, rules

use super::util::{has_flag, load_node, parse_flag_value, parse_output_arg, write_output};
use covgap::*;
use std::path::Path;

pub fn cmd_coverage(args: &[String]) -> Result<()> {
    let Some(report_path) = args.first() else {
        return Err("Usage: covgap coverage <report.xml> [--json]".into());
    };
    let json_output = has_flag(args, "--json");
    let output = parse_output_arg(args);

    let report = load_node(report_path)?;
    let mut builder = CoverageTreeBuilder::new();
    let tree = builder.build(&report);
    let summary = tree.summary();

    let content = if json_output {
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": summary,
            "classes": tree.classes(),
            "diagnostics": builder.diagnostics(),
        }))?
    } else {
        let mut out = format!(
            "Coverage: {} classes, {} methods\n",
            summary.classes, summary.methods
        );
        for (kind, count) in &summary.metrics {
            out.push_str(&format!(
                "  {:<12} {:>3}% ({}/{})\n",
                kind.to_string(),
                count.percentage(),
                count.covered,
                count.total()
            ));
        }
        out.push('\n');
        for class in tree.classes() {
            let line = class
                .percentage(CoverageMetricKind::Line)
                .map(|p| format!("{}%", p))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "  {} (LINE {}, {} methods)\n",
                class.fqcn(),
                line,
                class.children.len()
            ));
        }
        out
    };
    write_output(&output, &content)
}

pub fn cmd_trace(args: &[String]) -> Result<()> {
    let Some(report_path) = args.first() else {
        return Err("Usage: covgap trace <report.json> [--contract <f>] [--json]".into());
    };
    let json_output = has_flag(args, "--json");
    let output = parse_output_arg(args);

    let report = load_node(report_path)?;
    let trace = parse_execution_report(&report);
    let mut coverage = trace.endpoint_coverage();
    if let Some(contract_path) = parse_flag_value(args, "--contract") {
        let contract = parse_contract(&load_node(&contract_path)?);
        coverage = coverage.reconcile(&contract.endpoints);
    }

    let content = if json_output {
        serde_json::to_string_pretty(&serde_json::json!({
            "totals": trace.totals,
            "endpoints": coverage.records(),
        }))?
    } else {
        let totals = &trace.totals;
        let mut out = format!(
            "Scenarios: {} ({} passed, {} failed, {} skipped) across {} features\n",
            totals.scenarios, totals.passed, totals.failed, totals.skipped, totals.features
        );
        out.push_str(&format!("Endpoints: {}\n", coverage.len()));
        for record in coverage.records() {
            let mark = if record.covered { "✓" } else { "✗" };
            out.push_str(&format!(
                "  {} {} {} ({} scenarios)\n",
                mark, record.method, record.path, record.scenario_count
            ));
        }
        out
    };
    write_output(&output, &content)
}

pub fn cmd_rules(args: &[String]) -> Result<()> {
    let Some(requirements_path) = args.first() else {
        return Err("Usage: covgap rules <requirements.md> [--contract <f>] [--json]".into());
    };
    let json_output = has_flag(args, "--json");
    let output = parse_output_arg(args);

    let document = SourceDocument::read(Path::new(requirements_path))?;
    let mut rules = extract_rules(&document.content);
    if let Some(contract_path) = parse_flag_value(args, "--contract") {
        let contract = parse_contract(&load_node(&contract_path)?);
        rules = map_rules_to_endpoints(rules, &contract.endpoints);
    }

    let content = if json_output {
        serde_json::to_string_pretty(&rules)?
    } else {
        let mut out = format!("Rules: {}\n", rules.len());
        for rule in &rules {
            out.push_str(&format!(
                "  {} [{}/{}] {}: {}\n",
                rule.id, rule.priority, rule.category, rule.section, rule.description
            ));
            for endpoint in &rule.related_endpoints {
                out.push_str(&format!("    → {}\n", endpoint));
            }
        }
        out
    };
    write_output(&output, &content)
}
