// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # covgap: Coverage Reconciliation & Gap Analysis
//!
//! Merges four independent kinds of test evidence into one model of what
//! has and has not been exercised:
//!
//! - **Code coverage**: JaCoCo-style `report → package → class → method`
//!   counters
//! - **Execution traces**: Cucumber/Karate JSON results with the HTTP
//!   requests each step made
//! - **API contract**: OpenAPI 3 / Swagger 2 paths and operations
//! - **Requirements**: free-text or markdown business rules
//!
//! From that model it derives prioritized gaps (code, API, business rule)
//! and candidate test scenarios to close them.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use covgap::{AnalysisInputs, Analyzer, GapClassifier, ThresholdPolicy};
//!
//! let inputs = AnalysisInputs {
//!     coverage: "target/site/jacoco/jacoco.xml".into(),
//!     trace: "target/cucumber.json".into(),
//!     contract: "api/openapi.json".into(),
//!     requirements: "docs/requirements.md".into(),
//! };
//!
//! let analyzer = Analyzer::new(GapClassifier::new(ThresholdPolicy::default()));
//! let result = analyzer.analyze_files(&inputs)?;
//! if result.has_gaps() {
//!     println!("{}", result.to_report());
//! }
//! ```
//!
//! ## Pipeline
//!
//! Every report goes through [`normalize`] first. The normalizer turns XML,
//! JSON and YAML into a [`Node`] tree where every named child is a list,
//! so parsers never check whether a field held one object or many.
//!
//! | Stage | Module |
//! |-------|--------|
//! | Coverage tree | [`coverage`] |
//! | Execution trace, endpoint coverage | [`trace`] |
//! | Contract endpoints | [`contract`] |
//! | Business rules | [`requirements`], [`mapping`] |
//! | Gap classification | [`gaps`] |
//! | Scenario suggestions | [`suggest`] |
//! | Orchestration | [`analysis`] |

// Input models
pub mod contract;
pub mod coverage;
pub mod normalize;
pub mod requirements;
pub mod trace;

// Reconciliation and gaps
pub mod gaps;
pub mod mapping;
pub mod suggest;

// Orchestration
pub mod analysis;

// Ambient
pub mod config;
pub mod error;
pub mod logging;

pub use analysis::{
    AnalysisDocuments, AnalysisInputs, Analyzer, GapAnalysisResult, SourceDocument,
};
pub use config::{CovgapConfig, SuggestionConfig, SuggestionFallback, CONFIG_FILE};
pub use contract::{parse_contract, ApiContract, Endpoint, EndpointKey};
pub use coverage::{
    build_coverage_tree, CoverageMetricKind, CoverageNode, CoverageSummary, CoverageTree,
    CoverageTreeBuilder, MetricCount,
};
pub use error::{Diagnostic, DiagnosticKind, DiagnosticSource, Error, ParseError, Result};
pub use gaps::{ApiGap, BusinessRuleGap, CoverageGap, GapClassifier, ThresholdPolicy};
pub use mapping::map_rules_to_endpoints;
pub use normalize::{normalize, DocumentFormat, Node};
pub use requirements::{extract_rules, BusinessRule, RuleCategory, RulePriority};
pub use suggest::{
    CommandSuggestionProvider, DeterministicSynthesizer, SuggestionProvider, SuggestionRequest,
    TestScenario,
};
pub use trace::{
    parse_execution_report, reconcile, EndpointCoverage, EndpointCoverageRecord, ExecutionStatus,
    Trace, TraceParser,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
