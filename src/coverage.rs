//! Code coverage model: package → class → method tree with per-metric counters
//!
//! Built from a normalized bytecode-coverage report shaped like
//! `report → package* → class* → (counter*, method* → counter*)`.

use crate::error::{Diagnostic, DiagnosticSource};
use crate::normalize::Node;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Coverage metric kinds reported by bytecode instrumentation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageMetricKind {
    Line,
    Branch,
    Method,
    Instruction,
    Class,
}

impl CoverageMetricKind {
    pub const ALL: [CoverageMetricKind; 5] = [
        CoverageMetricKind::Line,
        CoverageMetricKind::Branch,
        CoverageMetricKind::Method,
        CoverageMetricKind::Instruction,
        CoverageMetricKind::Class,
    ];

    /// Map a raw counter `type` attribute; unknown types yield `None`
    pub fn from_counter_type(raw: &str) -> Option<Self> {
        match raw {
            "LINE" => Some(CoverageMetricKind::Line),
            "BRANCH" => Some(CoverageMetricKind::Branch),
            "METHOD" => Some(CoverageMetricKind::Method),
            "INSTRUCTION" => Some(CoverageMetricKind::Instruction),
            "CLASS" => Some(CoverageMetricKind::Class),
            _ => None,
        }
    }
}

impl std::fmt::Display for CoverageMetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoverageMetricKind::Line => write!(f, "LINE"),
            CoverageMetricKind::Branch => write!(f, "BRANCH"),
            CoverageMetricKind::Method => write!(f, "METHOD"),
            CoverageMetricKind::Instruction => write!(f, "INSTRUCTION"),
            CoverageMetricKind::Class => write!(f, "CLASS"),
        }
    }
}

/// Covered/missed counts for one metric
///
/// `total` and `percentage` are always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MetricCountRepr", into = "MetricCountRepr")]
pub struct MetricCount {
    pub kind: CoverageMetricKind,
    pub covered: u64,
    pub missed: u64,
}

impl MetricCount {
    pub fn new(kind: CoverageMetricKind, covered: u64, missed: u64) -> Self {
        Self {
            kind,
            covered,
            missed,
        }
    }

    /// Saturates at `u64::MAX`
    pub fn total(&self) -> u64 {
        self.covered.saturating_add(self.missed)
    }

    /// Rounded percentage in `0..=100`; zero when nothing is measurable
    pub fn percentage(&self) -> u32 {
        let covered = u128::from(self.covered);
        let total = covered + u128::from(self.missed);
        if total == 0 {
            return 0;
        }
        // round half up in integer arithmetic
        ((covered * 200 + total) / (total * 2)) as u32
    }

    pub fn add(&mut self, other: &MetricCount) {
        self.covered = self.covered.saturating_add(other.covered);
        self.missed = self.missed.saturating_add(other.missed);
    }
}

/// Wire form of [`MetricCount`] carrying the derived fields for consumers
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct MetricCountRepr {
    kind: CoverageMetricKind,
    covered: u64,
    missed: u64,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    percentage: u32,
}

impl From<MetricCount> for MetricCountRepr {
    fn from(count: MetricCount) -> Self {
        Self {
            kind: count.kind,
            covered: count.covered,
            missed: count.missed,
            total: count.total(),
            percentage: count.percentage(),
        }
    }
}

impl From<MetricCountRepr> for MetricCount {
    fn from(repr: MetricCountRepr) -> Self {
        MetricCount::new(repr.kind, repr.covered, repr.missed)
    }
}

impl JsonSchema for MetricCount {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "MetricCount".into()
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        MetricCountRepr::json_schema(generator)
    }
}

pub type MetricMap = BTreeMap<CoverageMetricKind, MetricCount>;

/// A class, or a method within a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageNode {
    pub package: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub coverage: MetricMap,
    /// Methods under a class; always empty for method nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CoverageNode>,
}

impl CoverageNode {
    /// Fully qualified class name (`com.acme.Billing`)
    pub fn fqcn(&self) -> String {
        if self.package.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.package, self.class_name)
        }
    }

    pub fn metric(&self, kind: CoverageMetricKind) -> Option<&MetricCount> {
        self.coverage.get(&kind)
    }

    pub fn percentage(&self, kind: CoverageMetricKind) -> Option<u32> {
        self.metric(kind).map(MetricCount::percentage)
    }

    pub fn is_method(&self) -> bool {
        self.method_name.is_some()
    }

    /// Display name: `Class.method` or `Class`
    pub fn display_name(&self) -> String {
        match &self.method_name {
            Some(method) => format!("{}.{}", self.class_name, method),
            None => self.class_name.clone(),
        }
    }
}

/// Class nodes keyed by fully qualified class name, in report order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageTree {
    classes: Vec<CoverageNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CoverageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a class node, replacing any earlier node with the same FQCN
    pub fn insert(&mut self, node: CoverageNode) {
        let key = node.fqcn();
        match self.index.get(&key) {
            Some(&slot) => self.classes[slot] = node,
            None => {
                self.index.insert(key, self.classes.len());
                self.classes.push(node);
            }
        }
    }

    pub fn get(&self, fqcn: &str) -> Option<&CoverageNode> {
        self.index.get(fqcn).map(|&slot| &self.classes[slot])
    }

    pub fn classes(&self) -> &[CoverageNode] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Sum every class and method node into a flat per-metric summary
    pub fn summary(&self) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        for class in &self.classes {
            summary.classes += 1;
            summary.absorb(&class.coverage);
            for method in &class.children {
                summary.methods += 1;
                summary.absorb(&method.coverage);
            }
        }
        summary
    }
}

/// Flat per-metric totals over a whole tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CoverageSummary {
    pub classes: usize,
    pub methods: usize,
    pub metrics: MetricMap,
}

impl CoverageSummary {
    fn absorb(&mut self, counts: &MetricMap) {
        for (kind, count) in counts {
            self.metrics
                .entry(*kind)
                .or_insert_with(|| MetricCount::new(*kind, 0, 0))
                .add(count);
        }
    }

    pub fn percentage(&self, kind: CoverageMetricKind) -> Option<u32> {
        self.metrics.get(&kind).map(MetricCount::percentage)
    }
}

/// Builds a [`CoverageTree`] from a normalized coverage report
#[derive(Debug, Default)]
pub struct CoverageTreeBuilder {
    diagnostics: Vec<Diagnostic>,
}

/// Build a coverage tree, discarding diagnostics
pub fn build_coverage_tree(report: &Node) -> CoverageTree {
    CoverageTreeBuilder::new().build(report)
}

impl CoverageTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn build(&mut self, report: &Node) -> CoverageTree {
        let mut tree = CoverageTree::new();
        for package in report.children("package") {
            let package_name = dotted(package.attr("name").unwrap_or_default());
            for class in package.children("class") {
                let node = self.class_node(&package_name, class);
                tree.insert(node);
            }
        }
        debug!(classes = tree.len(), "built coverage tree");
        tree
    }

    fn class_node(&mut self, package: &str, class: &Node) -> CoverageNode {
        let class_name = simple_class_name(package, class.attr("name").unwrap_or_default());
        let coverage = self.counters(class, &class_name);

        let children = class
            .children("method")
            .iter()
            .map(|method| {
                let method_name = method.attr("name").unwrap_or_default().to_string();
                let context = format!("{}.{}", class_name, method_name);
                CoverageNode {
                    package: package.to_string(),
                    class_name: class_name.clone(),
                    line: method.attr("line").and_then(|l| l.trim().parse().ok()),
                    coverage: self.counters(method, &context),
                    method_name: Some(method_name),
                    source_file: None,
                    children: Vec::new(),
                }
            })
            .collect();

        CoverageNode {
            package: package.to_string(),
            class_name,
            method_name: None,
            line: None,
            source_file: class.attr("sourcefilename").map(str::to_string),
            coverage,
            children,
        }
    }

    fn counters(&mut self, node: &Node, context: &str) -> MetricMap {
        let mut map = MetricMap::new();
        for counter in node.children("counter") {
            let raw_type = counter.attr("type").unwrap_or_default();
            let Some(kind) = CoverageMetricKind::from_counter_type(raw_type) else {
                self.diagnostics.push(Diagnostic::unrecognized(
                    DiagnosticSource::Coverage,
                    format!("skipping counter of unknown type '{}' in {}", raw_type, context),
                ));
                continue;
            };
            let covered = parse_count(counter.attr("covered"));
            let missed = parse_count(counter.attr("missed"));
            map.insert(kind, MetricCount::new(kind, covered, missed));
        }
        map
    }
}

fn parse_count(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn dotted(name: &str) -> String {
    name.replace('/', ".")
}

/// Strip the package prefix from a class name that carries one
fn simple_class_name(package: &str, raw: &str) -> String {
    let name = dotted(raw);
    if package.is_empty() {
        return name;
    }
    name.strip_prefix(package)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(str::to_string)
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_xml;
    use pretty_assertions::assert_eq;

    const REPORT: &str = r#"<report name="demo">
  <package name="com/acme">
    <class name="com/acme/Billing" sourcefilename="Billing.java">
      <method name="charge" desc="()V" line="12">
        <counter type="LINE" missed="4" covered="6"/>
        <counter type="BRANCH" missed="1" covered="9"/>
      </method>
      <method name="refund" line="30">
        <counter type="LINE" covered="5"/>
      </method>
      <counter type="LINE" missed="4" covered="11"/>
      <counter type="COMPLEXITY" missed="1" covered="1"/>
    </class>
  </package>
</report>"#;

    #[test]
    fn test_percentage_rounds_and_handles_zero() {
        assert_eq!(MetricCount::new(CoverageMetricKind::Line, 0, 0).percentage(), 0);
        assert_eq!(MetricCount::new(CoverageMetricKind::Line, 1, 2).percentage(), 33);
        assert_eq!(MetricCount::new(CoverageMetricKind::Line, 2, 1).percentage(), 67);
        assert_eq!(MetricCount::new(CoverageMetricKind::Line, 1, 1).percentage(), 50);
        assert_eq!(MetricCount::new(CoverageMetricKind::Line, 7, 0).percentage(), 100);
    }

    #[test]
    fn test_huge_counters_saturate() {
        let report = normalize_xml(
            r#"<report><package name="p"><class name="p/Big">
                 <method name="m"><counter type="LINE" covered="18446744073709551615" missed="1"/></method>
                 <counter type="LINE" covered="18446744073709551615" missed="0"/>
               </class></package></report>"#,
        )
        .unwrap();
        let tree = build_coverage_tree(&report);
        let method = &tree.get("p.Big").unwrap().children[0];
        let line = method.metric(CoverageMetricKind::Line).unwrap();
        assert_eq!(line.total(), u64::MAX);
        assert_eq!(line.percentage(), 100);

        let summary = tree.summary();
        let total = summary.metrics[&CoverageMetricKind::Line];
        assert_eq!(total.covered, u64::MAX);
        assert_eq!(total.missed, 1);
        assert!(total.percentage() <= 100);
    }

    #[test]
    fn test_build_tree_from_report() {
        let report = normalize_xml(REPORT).unwrap();
        let mut builder = CoverageTreeBuilder::new();
        let tree = builder.build(&report);

        let billing = tree.get("com.acme.Billing").unwrap();
        assert_eq!(billing.package, "com.acme");
        assert_eq!(billing.class_name, "Billing");
        assert_eq!(billing.source_file.as_deref(), Some("Billing.java"));
        assert_eq!(billing.percentage(CoverageMetricKind::Line), Some(73));
        assert_eq!(billing.children.len(), 2);

        let charge = &billing.children[0];
        assert_eq!(charge.method_name.as_deref(), Some("charge"));
        assert_eq!(charge.line, Some(12));
        assert_eq!(charge.percentage(CoverageMetricKind::Line), Some(60));
        assert_eq!(charge.percentage(CoverageMetricKind::Branch), Some(90));

        // missing `missed` defaults to zero
        let refund = &billing.children[1];
        assert_eq!(refund.metric(CoverageMetricKind::Line).unwrap().missed, 0);

        // COMPLEXITY is skipped with a diagnostic
        assert!(billing.metric(CoverageMetricKind::Instruction).is_none());
        assert_eq!(builder.diagnostics().len(), 1);
        assert!(builder.diagnostics()[0].message.contains("COMPLEXITY"));
    }

    #[test]
    fn test_build_is_idempotent() {
        let report = normalize_xml(REPORT).unwrap();
        assert_eq!(build_coverage_tree(&report), build_coverage_tree(&report));
    }

    #[test]
    fn test_summary_sums_classes_and_methods() {
        let report = normalize_xml(REPORT).unwrap();
        let summary = build_coverage_tree(&report).summary();
        let line = summary.metrics[&CoverageMetricKind::Line];
        assert_eq!(line.covered, 11 + 6 + 5);
        assert_eq!(line.missed, 4 + 4);
        assert_eq!(summary.classes, 1);
        assert_eq!(summary.methods, 2);
        assert_eq!(summary.percentage(CoverageMetricKind::Line), Some(73));
    }

    #[test]
    fn test_metric_count_serializes_derived_fields() {
        let json = serde_json::to_value(MetricCount::new(CoverageMetricKind::Branch, 3, 1)).unwrap();
        assert_eq!(json["kind"], "BRANCH");
        assert_eq!(json["total"], 4);
        assert_eq!(json["percentage"], 75);

        let back: MetricCount = serde_json::from_value(json).unwrap();
        assert_eq!(back, MetricCount::new(CoverageMetricKind::Branch, 3, 1));
    }

    #[test]
    fn test_simple_class_name() {
        assert_eq!(simple_class_name("com.acme", "com/acme/Billing"), "Billing");
        assert_eq!(simple_class_name("com.acme", "Billing"), "Billing");
        assert_eq!(simple_class_name("", "Top"), "Top");
    }
}
