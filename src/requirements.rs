//! Business-rule extraction from free-text requirements
//!
//! Heuristic, line-oriented: headings and `N.N` section numbers set the
//! current section, rule keywords open a rule, and following lines are
//! folded into it until a blank line or the next heading. When nothing is
//! found, blank-line paragraphs that look like requirements are kept instead.

use crate::contract::EndpointKey;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

static NUMBERED_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)+\.?\s+(.*)$").expect("static regex"));
static EXPLICIT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:R|TS)-\d+\b").expect("static regex"));

// Heuristic keywords match at the start of a word
static SECURITY: LazyLock<Regex> = LazyLock::new(|| keywords(&["security", "auth"]));
static PAYMENT: LazyLock<Regex> = LazyLock::new(|| keywords(&["payment", "transaction"]));
static USER: LazyLock<Regex> = LazyLock::new(|| keywords(&["user", "account"]));
static HIGH: LazyLock<Regex> = LazyLock::new(|| keywords(&["critical", "must"]));
static MEDIUM: LazyLock<Regex> = LazyLock::new(|| keywords(&["should", "recommended"]));
static LOW: LazyLock<Regex> = LazyLock::new(|| keywords(&["may", "optional"]));

fn keywords(words: &[&str]) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})", words.join("|"))).expect("static regex")
}

/// Phrases that mark a line as the start of a rule (matched case-insensitively)
const RULE_MARKERS: [&str; 6] = [
    "validation rule",
    "rule",
    "requirement",
    "limit",
    "must ",
    "should ",
];

const FALLBACK_MARKERS: [&str; 5] = ["rule", "requirement", "validation", "must", "should"];

const DEFAULT_SECTION: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum RuleCategory {
    General,
    Security,
    Payment,
    User,
}

impl RuleCategory {
    /// First matching keyword group wins
    pub fn classify(text: &str) -> Self {
        if SECURITY.is_match(text) {
            RuleCategory::Security
        } else if PAYMENT.is_match(text) {
            RuleCategory::Payment
        } else if USER.is_match(text) {
            RuleCategory::User
        } else {
            RuleCategory::General
        }
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleCategory::General => write!(f, "General"),
            RuleCategory::Security => write!(f, "Security"),
            RuleCategory::Payment => write!(f, "Payment"),
            RuleCategory::User => write!(f, "User"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum RulePriority {
    High,
    Medium,
    Low,
}

impl RulePriority {
    /// Checked in order high, medium, low; defaults to medium
    pub fn classify(text: &str) -> Self {
        if HIGH.is_match(text) {
            RulePriority::High
        } else if MEDIUM.is_match(text) {
            RulePriority::Medium
        } else if LOW.is_match(text) {
            RulePriority::Low
        } else {
            RulePriority::Medium
        }
    }
}

impl std::fmt::Display for RulePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RulePriority::High => write!(f, "High"),
            RulePriority::Medium => write!(f, "Medium"),
            RulePriority::Low => write!(f, "Low"),
        }
    }
}

/// A requirement statement extracted from free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BusinessRule {
    pub id: String,
    pub section: String,
    pub description: String,
    pub category: RuleCategory,
    pub priority: RulePriority,
    #[serde(default)]
    pub related_endpoints: Vec<EndpointKey>,
}

impl BusinessRule {
    pub fn new(id: impl Into<String>, section: impl Into<String>, description: impl Into<String>) -> Self {
        let section = section.into();
        let description = description.into();
        Self {
            id: id.into(),
            category: RuleCategory::classify(&format!("{} {}", section, description)),
            priority: RulePriority::classify(&description),
            section,
            description,
            related_endpoints: Vec::new(),
        }
    }
}

/// Extract business rules from a requirements document
pub fn extract_rules(text: &str) -> Vec<BusinessRule> {
    let rules = structured_pass(text);
    if !rules.is_empty() {
        debug!(rules = rules.len(), "extracted business rules");
        return rules;
    }
    let rules = paragraph_pass(text);
    debug!(rules = rules.len(), "extracted business rules from paragraphs");
    rules
}

struct OpenRule {
    id: String,
    section: String,
    lines: Vec<String>,
}

fn structured_pass(text: &str) -> Vec<BusinessRule> {
    let mut rules = Vec::new();
    let mut section = DEFAULT_SECTION.to_string();
    let mut open: Option<OpenRule> = None;
    let reserved: HashSet<&str> = EXPLICIT_ID.find_iter(text).map(|m| m.as_str()).collect();

    for raw_line in text.lines() {
        let line = raw_line.trim();

        if let Some(title) = section_title(line) {
            close(&mut open, &mut rules);
            section = title;
            continue;
        }
        if line.is_empty() {
            close(&mut open, &mut rules);
            continue;
        }
        if let Some(rule) = open.as_mut() {
            rule.lines.push(strip_bullet(line).to_string());
            continue;
        }
        if is_rule_start(line) {
            let id = EXPLICIT_ID
                .find(line)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| implicit_id(&rules, &reserved));
            open = Some(OpenRule {
                id,
                section: section.clone(),
                lines: vec![strip_bullet(line).to_string()],
            });
        }
    }
    close(&mut open, &mut rules);
    rules
}

/// Position-based id, skipping ids claimed explicitly anywhere in the document
fn implicit_id(rules: &[BusinessRule], reserved: &HashSet<&str>) -> String {
    let mut n = rules.len() + 1;
    loop {
        let id = format!("R-{}", n);
        if !reserved.contains(id.as_str()) && rules.iter().all(|rule| rule.id != id) {
            return id;
        }
        n += 1;
    }
}

fn close(open: &mut Option<OpenRule>, rules: &mut Vec<BusinessRule>) {
    if let Some(rule) = open.take() {
        rules.push(BusinessRule::new(rule.id, rule.section, rule.lines.join(" ")));
    }
}

fn paragraph_pass(text: &str) -> Vec<BusinessRule> {
    let mut rules = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush_paragraph(&mut paragraph, &mut rules);
        } else {
            paragraph.push(line);
        }
    }
    flush_paragraph(&mut paragraph, &mut rules);
    rules
}

fn flush_paragraph(paragraph: &mut Vec<&str>, rules: &mut Vec<BusinessRule>) {
    if paragraph.is_empty() {
        return;
    }
    let body = paragraph.join(" ");
    paragraph.clear();
    let lower = body.to_lowercase();
    if body.contains(':') && FALLBACK_MARKERS.iter().any(|m| lower.contains(m)) {
        let mut rule = BusinessRule::new(format!("R-{}", rules.len() + 1), DEFAULT_SECTION, body);
        rule.category = RuleCategory::General;
        rule.priority = RulePriority::Medium;
        rules.push(rule);
    }
}

/// Section title when the line is a markdown heading or numbered sub-section
fn section_title(line: &str) -> Option<String> {
    if line.starts_with('#') {
        return Some(line.trim_start_matches('#').trim().to_string());
    }
    NUMBERED_SECTION
        .captures(line)
        .map(|caps| caps[1].trim().to_string())
}

fn is_rule_start(line: &str) -> bool {
    let lower = line.to_lowercase();
    RULE_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn strip_bullet(line: &str) -> &str {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line)
        .trim()
}
