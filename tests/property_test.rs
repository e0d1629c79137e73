//! Property-based tests for metric arithmetic, ordering and mapping
//!
//! Uses proptest to generate random reports and verify invariants

use covgap::gaps::method_rank;
use covgap::normalize::normalize_xml;
use covgap::{
    build_coverage_tree, map_rules_to_endpoints, ApiGap, BusinessRule, CoverageGap, CoverageMetricKind,
    CoverageTree, Endpoint, EndpointCoverage, GapClassifier, MetricCount, ThresholdPolicy,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

const COUNTER_TYPES: [&str; 5] = ["LINE", "BRANCH", "METHOD", "INSTRUCTION", "CLASS"];
const METHODS: [&str; 8] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "TRACE"];
const WORDS: [&str; 6] = ["orders", "payments", "users", "refund", "login", "audit"];

/// Counter type index -> (covered, missed); at most one counter per type
type Counters = BTreeMap<usize, (u64, u64)>;

#[derive(Debug, Clone)]
struct ClassSpec {
    counters: Counters,
    methods: Vec<Counters>,
}

fn counters() -> impl Strategy<Value = Counters> {
    prop::collection::btree_map(0..COUNTER_TYPES.len(), (0..60u64, 0..60u64), 0..5)
}

fn class_spec() -> impl Strategy<Value = ClassSpec> {
    (counters(), prop::collection::vec(counters(), 0..4))
        .prop_map(|(counters, methods)| ClassSpec { counters, methods })
}

fn any_report() -> impl Strategy<Value = Vec<ClassSpec>> {
    prop::collection::vec(class_spec(), 0..6)
}

fn counter_xml(counters: &Counters) -> String {
    counters
        .iter()
        .map(|(kind, (covered, missed))| {
            format!(
                r#"<counter type="{}" missed="{}" covered="{}"/>"#,
                COUNTER_TYPES[*kind], missed, covered
            )
        })
        .collect()
}

fn report_xml(classes: &[ClassSpec]) -> String {
    let mut xml = String::from(r#"<report name="prop"><package name="org/example">"#);
    for (i, class) in classes.iter().enumerate() {
        xml.push_str(&format!(r#"<class name="org/example/C{}">"#, i));
        for (j, method) in class.methods.iter().enumerate() {
            xml.push_str(&format!(r#"<method name="m{}" line="{}">"#, j, j + 1));
            xml.push_str(&counter_xml(method));
            xml.push_str("</method>");
        }
        xml.push_str(&counter_xml(&class.counters));
        xml.push_str("</class>");
    }
    xml.push_str("</package></report>");
    xml
}

fn tree_of(classes: &[ClassSpec]) -> CoverageTree {
    build_coverage_tree(&normalize_xml(&report_xml(classes)).unwrap())
}

/// (class index, 0 for the class or method index + 1, metric) as laid out in the report
fn tree_position(gap: &CoverageGap) -> (usize, usize, CoverageMetricKind) {
    let class = gap.class_name.strip_prefix('C').and_then(|n| n.parse().ok()).unwrap();
    let method = gap
        .method_name
        .as_deref()
        .map_or(0, |m| m.strip_prefix('m').and_then(|n| n.parse::<usize>().ok()).unwrap() + 1);
    (class, method, gap.metric)
}

fn any_endpoints() -> impl Strategy<Value = Vec<Endpoint>> {
    prop::collection::vec((0..METHODS.len(), 0..WORDS.len(), 0..WORDS.len()), 0..12).prop_map(
        |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (method, segment, tag))| {
                    let mut endpoint =
                        Endpoint::new(METHODS[method], &format!("/{}/{{id}}", WORDS[segment]));
                    endpoint.tags = vec![WORDS[tag].to_string()];
                    endpoint.summary = Some(format!("{} {}", WORDS[tag], WORDS[segment]));
                    endpoint.operation_id = Some(format!("op{}", i));
                    endpoint
                })
                .collect()
        },
    )
}

fn input_index(gap: &ApiGap) -> usize {
    gap.endpoint
        .operation_id
        .as_deref()
        .and_then(|id| id.strip_prefix("op"))
        .and_then(|n| n.parse().ok())
        .unwrap()
}

fn any_rules() -> impl Strategy<Value = Vec<BusinessRule>> {
    prop::collection::vec(prop::collection::vec(0..WORDS.len(), 1..5), 0..6).prop_map(|rules| {
        rules
            .into_iter()
            .enumerate()
            .map(|(i, words)| {
                let text: Vec<&str> = words.into_iter().map(|w| WORDS[w]).collect();
                BusinessRule::new(format!("R-{}", i + 1), "General", text.join(" "))
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn test_percentage_formula_and_bounds(covered in 0..100_000u64, missed in 0..100_000u64) {
        let count = MetricCount::new(CoverageMetricKind::Line, covered, missed);
        let total = covered + missed;
        prop_assert_eq!(count.total(), total);
        let expected = if total == 0 {
            0
        } else {
            // round half up
            ((covered * 200 + total) / (2 * total)) as u32
        };
        prop_assert_eq!(count.percentage(), expected);
        prop_assert!(count.percentage() <= 100);
    }

    #[test]
    fn test_build_is_idempotent(classes in any_report()) {
        let report = normalize_xml(&report_xml(&classes)).unwrap();
        let first = build_coverage_tree(&report);
        let second = build_coverage_tree(&report);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_summary_matches_raw_counters(classes in any_report()) {
        let tree = tree_of(&classes);
        let summary = tree.summary();

        let mut expected: BTreeMap<CoverageMetricKind, (u64, u64)> = BTreeMap::new();
        for class in &classes {
            for counters in std::iter::once(&class.counters).chain(&class.methods) {
                for (kind, (covered, missed)) in counters {
                    let kind = CoverageMetricKind::from_counter_type(COUNTER_TYPES[*kind]).unwrap();
                    let entry = expected.entry(kind).or_default();
                    entry.0 += covered;
                    entry.1 += missed;
                }
            }
        }
        let actual: BTreeMap<CoverageMetricKind, (u64, u64)> = summary
            .metrics
            .iter()
            .map(|(kind, count)| (*kind, (count.covered, count.missed)))
            .collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(summary.classes, classes.len());
        prop_assert_eq!(summary.methods, classes.iter().map(|c| c.methods.len()).sum::<usize>());
    }

    #[test]
    fn test_code_gap_iff_below_threshold(classes in any_report(), full in any::<bool>()) {
        let policy = if full { ThresholdPolicy::full() } else { ThresholdPolicy::default() };
        let classifier = GapClassifier::new(policy.clone());
        let tree = tree_of(&classes);
        let gaps = classifier.code_gaps(&tree);

        for class in tree.classes() {
            for node in std::iter::once(class).chain(&class.children) {
                for kind in CoverageMetricKind::ALL {
                    let expected = match (node.percentage(kind), policy.threshold(kind)) {
                        (Some(pct), Some(threshold)) => pct < threshold,
                        _ => false,
                    };
                    let present = gaps.iter().any(|g| {
                        g.fqcn() == node.fqcn() && g.method_name == node.method_name && g.metric == kind
                    });
                    prop_assert_eq!(present, expected);
                }
            }
        }
    }

    #[test]
    fn test_code_gaps_sorted_by_line_coverage(classes in any_report()) {
        let gaps = GapClassifier::default().code_gaps(&tree_of(&classes));
        for pair in gaps.windows(2) {
            prop_assert!(pair[0].line_coverage.unwrap_or(0) <= pair[1].line_coverage.unwrap_or(0));
        }
    }

    #[test]
    fn test_code_gap_ties_keep_tree_order(classes in any_report(), full in any::<bool>()) {
        let policy = if full { ThresholdPolicy::full() } else { ThresholdPolicy::default() };
        let gaps = GapClassifier::new(policy).code_gaps(&tree_of(&classes));
        for pair in gaps.windows(2) {
            if pair[0].line_coverage.unwrap_or(0) == pair[1].line_coverage.unwrap_or(0) {
                prop_assert!(tree_position(&pair[0]) < tree_position(&pair[1]));
            }
        }
    }

    #[test]
    fn test_api_gaps_stable_method_order(endpoints in any_endpoints()) {
        let gaps = GapClassifier::default().api_gaps(&endpoints, &EndpointCoverage::default());
        prop_assert_eq!(gaps.len(), endpoints.len());
        for pair in gaps.windows(2) {
            let a = method_rank(&pair[0].endpoint.method);
            let b = method_rank(&pair[1].endpoint.method);
            prop_assert!(a <= b);
            if a == b {
                prop_assert!(input_index(&pair[0]) < input_index(&pair[1]));
            }
        }
    }

    #[test]
    fn test_mapper_never_duplicates(rules in any_rules(), endpoints in any_endpoints()) {
        let mapped = map_rules_to_endpoints(rules, &endpoints);
        for rule in &mapped {
            let mut keys = rule.related_endpoints.clone();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), rule.related_endpoints.len());
        }
    }

    #[test]
    fn test_unmapped_rules_are_gaps(rules in any_rules()) {
        let gaps = GapClassifier::default().business_rule_gaps(&rules, &EndpointCoverage::default());
        prop_assert_eq!(gaps.len(), rules.len());
        for pair in gaps.windows(2) {
            prop_assert!(pair[0].rule.priority <= pair[1].rule.priority);
        }
    }
}
