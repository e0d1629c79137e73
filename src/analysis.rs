//! Gap analysis orchestration
//!
//! Sequences one analysis run:
//! 1. Confirm all four inputs exist (nothing is parsed when one is missing)
//! 2. Parse coverage, trace and specification concurrently
//! 3. Map rules to endpoints and reconcile endpoint coverage
//! 4. Classify code, API and business-rule gaps
//! 5. Ask the suggestion provider for scenarios, falling back when it fails

use crate::config::{CovgapConfig, SuggestionFallback};
use crate::contract::{parse_contract, ApiContract};
use crate::coverage::{CoverageMetricKind, CoverageSummary, CoverageTree, CoverageTreeBuilder};
use crate::error::{Diagnostic, DiagnosticKind, DiagnosticSource, Error, ParseError, Result};
use crate::gaps::{truncate, ApiGap, BusinessRuleGap, CoverageGap, GapClassifier};
use crate::mapping::map_rules_to_endpoints;
use crate::normalize::{normalize_as, DocumentFormat};
use crate::requirements::{extract_rules, BusinessRule};
use crate::suggest::{
    CommandSuggestionProvider, DeterministicSynthesizer, SuggestionProvider, SuggestionRequest,
    TestScenario,
};
use crate::trace::{EndpointCoverageRecord, Trace, TraceParser, TraceTotals};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::thread::ScopedJoinHandle;
use tracing::{debug, info};

/// Locations of the four analysis inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisInputs {
    pub coverage: PathBuf,
    pub trace: PathBuf,
    pub contract: PathBuf,
    pub requirements: PathBuf,
}

impl AnalysisInputs {
    fn paths(&self) -> [&Path; 4] {
        [&self.coverage, &self.trace, &self.contract, &self.requirements]
    }
}

/// Raw content of one input, labelled with where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub content: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Read a file; undecodable text is a malformed document, not an IO failure
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::MissingInput {
                path: path.to_path_buf(),
            },
            _ => Error::Read {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let content = String::from_utf8(bytes).map_err(|e| {
            let offset = e.utf8_error().valid_up_to();
            let lossy = String::from_utf8_lossy(e.as_bytes());
            Error::malformed(
                path,
                ParseError::at_offset("UTF-8", "invalid byte sequence", &lossy, offset),
            )
        })?;
        Ok(Self::new(path, content))
    }
}

/// The four inputs, already loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisDocuments {
    pub coverage: SourceDocument,
    pub trace: SourceDocument,
    pub contract: SourceDocument,
    pub requirements: SourceDocument,
}

impl AnalysisDocuments {
    /// Read every input; fails on the first missing path before reading any
    pub fn load(inputs: &AnalysisInputs) -> Result<Self> {
        ensure_present(inputs)?;
        Ok(Self {
            coverage: SourceDocument::read(&inputs.coverage)?,
            trace: SourceDocument::read(&inputs.trace)?,
            contract: SourceDocument::read(&inputs.contract)?,
            requirements: SourceDocument::read(&inputs.requirements)?,
        })
    }

    /// Short, stable digest of all four inputs
    pub fn fingerprint(&self) -> String {
        Sources::from(self).fingerprint()
    }
}

fn ensure_present(inputs: &AnalysisInputs) -> Result<()> {
    for path in inputs.paths() {
        if !path.is_file() {
            return Err(Error::MissingInput {
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}

/// Inputs that made it past reading; `None` marks a source skipped as undecodable
#[derive(Clone, Copy)]
struct Sources<'a> {
    coverage: Option<&'a SourceDocument>,
    trace: Option<&'a SourceDocument>,
    contract: Option<&'a SourceDocument>,
    requirements: Option<&'a SourceDocument>,
}

impl<'a> From<&'a AnalysisDocuments> for Sources<'a> {
    fn from(documents: &'a AnalysisDocuments) -> Self {
        Self {
            coverage: Some(&documents.coverage),
            trace: Some(&documents.trace),
            contract: Some(&documents.contract),
            requirements: Some(&documents.requirements),
        }
    }
}

impl Sources<'_> {
    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for document in [self.coverage, self.trace, self.contract, self.requirements] {
            hasher.update(document.map_or("", |d| d.content.as_str()).as_bytes());
            hasher.update([0u8]);
        }
        let hash = hasher.finalize();
        format!("sha256:{}", hex::encode(&hash[..8]))
    }
}

/// Output of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GapAnalysisResult {
    pub code_gaps: Vec<CoverageGap>,
    pub api_gaps: Vec<ApiGap>,
    pub business_rule_gaps: Vec<BusinessRuleGap>,
    pub scenarios: Vec<TestScenario>,

    pub coverage_summary: CoverageSummary,
    pub endpoint_coverage: Vec<EndpointCoverageRecord>,
    pub trace_totals: TraceTotals,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,

    /// Provider that produced `scenarios` ("none" when none did)
    pub suggestion_source: String,
    #[schemars(with = "String")]
    pub generated_at: DateTime<Utc>,
    pub input_fingerprint: String,
}

impl GapAnalysisResult {
    pub fn gap_count(&self) -> usize {
        self.code_gaps.len() + self.api_gaps.len() + self.business_rule_gaps.len()
    }

    pub fn has_gaps(&self) -> bool {
        self.gap_count() > 0
    }

    /// Human-readable report
    pub fn to_report(&self) -> String {
        let mut out = String::new();

        let status = if self.has_gaps() {
            "✗ GAPS FOUND"
        } else {
            "✓ NO GAPS"
        };
        out.push_str(&format!("Gap analysis: {}\n", status));
        out.push_str(&format!(
            "Coverage: {} classes, {} methods",
            self.coverage_summary.classes, self.coverage_summary.methods
        ));
        for kind in [
            CoverageMetricKind::Line,
            CoverageMetricKind::Branch,
            CoverageMetricKind::Method,
        ] {
            if let Some(pct) = self.coverage_summary.percentage(kind) {
                out.push_str(&format!(", {} {}%", kind, pct));
            }
        }
        out.push('\n');

        let covered = self.endpoint_coverage.iter().filter(|r| r.covered).count();
        out.push_str(&format!(
            "Endpoints: {}/{} covered\n",
            covered,
            self.endpoint_coverage.len()
        ));
        out.push_str(&format!(
            "Scenarios executed: {} ({} passed, {} failed, {} skipped)\n",
            self.trace_totals.scenarios,
            self.trace_totals.passed,
            self.trace_totals.failed,
            self.trace_totals.skipped
        ));

        if !self.code_gaps.is_empty() {
            out.push_str(&format!("\nCode gaps ({}):\n", self.code_gaps.len()));
            for gap in &self.code_gaps {
                let target = match &gap.method_name {
                    Some(method) => format!("{}.{}", gap.fqcn(), method),
                    None => gap.fqcn(),
                };
                out.push_str(&format!(
                    "  {} [{}]: {}% < {}%\n",
                    target, gap.metric, gap.coverage, gap.threshold
                ));
                out.push_str(&format!("    → {}\n", gap.suggestion));
            }
        }

        if !self.api_gaps.is_empty() {
            out.push_str(&format!("\nAPI gaps ({}):\n", self.api_gaps.len()));
            for gap in &self.api_gaps {
                out.push_str(&format!("  {}\n", gap.endpoint.key()));
                out.push_str(&format!("    → {}\n", gap.suggestion));
            }
        }

        if !self.business_rule_gaps.is_empty() {
            out.push_str(&format!(
                "\nBusiness rule gaps ({}):\n",
                self.business_rule_gaps.len()
            ));
            for gap in &self.business_rule_gaps {
                out.push_str(&format!(
                    "  {} [{}/{}]: {}\n",
                    gap.rule.id,
                    gap.rule.priority,
                    gap.rule.category,
                    truncate(&gap.rule.description, 80)
                ));
            }
        }

        if !self.scenarios.is_empty() {
            out.push_str(&format!(
                "\nSuggested scenarios ({}, {}):\n",
                self.scenarios.len(),
                self.suggestion_source
            ));
            for scenario in &self.scenarios {
                out.push_str(&format!(
                    "  {} [{}] {}\n",
                    scenario.id, scenario.priority, scenario.title
                ));
            }
        }

        if !self.diagnostics.is_empty() {
            out.push_str("\nDiagnostics:\n");
            for diagnostic in &self.diagnostics {
                out.push_str(&format!("  {}\n", diagnostic));
            }
        }

        out
    }
}

/// A parsed source plus the non-fatal skips recorded while parsing it
struct Parsed<T> {
    value: T,
    diagnostics: Vec<Diagnostic>,
}

/// Runs the full reconciliation and gap analysis pipeline
pub struct Analyzer {
    classifier: GapClassifier,
    provider: Option<Box<dyn SuggestionProvider>>,
    fallback: SuggestionFallback,
    allow_partial: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(GapClassifier::default())
    }
}

impl Analyzer {
    /// Analyzer with no external collaborator; scenarios are synthesized
    pub fn new(classifier: GapClassifier) -> Self {
        Self {
            classifier,
            provider: None,
            fallback: SuggestionFallback::Deterministic,
            allow_partial: false,
        }
    }

    /// Build from configuration, wiring the command provider when one is set
    pub fn from_config(config: &CovgapConfig) -> Self {
        let mut analyzer = Self::new(GapClassifier::new(config.threshold_policy()))
            .with_fallback(config.suggestions.fallback)
            .with_allow_partial(config.allow_partial);
        if let Some(command) = &config.suggestions.command {
            analyzer = analyzer.with_provider(Box::new(CommandSuggestionProvider::new(
                command.clone(),
                config.suggestions.args.clone(),
                config.suggestions.timeout(),
            )));
        }
        analyzer
    }

    pub fn with_provider(mut self, provider: Box<dyn SuggestionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_fallback(mut self, fallback: SuggestionFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Continue with empty models for sources that fail to parse
    pub fn with_allow_partial(mut self, allow_partial: bool) -> Self {
        self.allow_partial = allow_partial;
        self
    }

    pub fn classifier(&self) -> &GapClassifier {
        &self.classifier
    }

    /// Analyze the four input files
    pub fn analyze_files(&self, inputs: &AnalysisInputs) -> Result<GapAnalysisResult> {
        ensure_present(inputs)?;
        let mut diagnostics = Vec::new();
        let mut read = |path: &Path, source| {
            self.settle(SourceDocument::read(path), source, &mut diagnostics)
        };
        let coverage = read(inputs.coverage.as_path(), DiagnosticSource::Coverage)?;
        let trace = read(inputs.trace.as_path(), DiagnosticSource::Trace)?;
        let contract = read(inputs.contract.as_path(), DiagnosticSource::Contract)?;
        let requirements = read(inputs.requirements.as_path(), DiagnosticSource::Requirements)?;

        let sources = Sources {
            coverage: coverage.as_ref(),
            trace: trace.as_ref(),
            contract: contract.as_ref(),
            requirements: requirements.as_ref(),
        };
        self.run(sources, diagnostics)
    }

    /// Analyze already-loaded inputs
    pub fn analyze(&self, documents: &AnalysisDocuments) -> Result<GapAnalysisResult> {
        self.run(Sources::from(documents), Vec::new())
    }

    fn run(&self, sources: Sources<'_>, mut diagnostics: Vec<Diagnostic>) -> Result<GapAnalysisResult> {
        let label = |d: Option<&SourceDocument>| {
            d.map_or_else(|| "(skipped)".to_string(), |d| d.path.display().to_string())
        };
        info!(
            coverage = %label(sources.coverage),
            trace = %label(sources.trace),
            contract = %label(sources.contract),
            requirements = %label(sources.requirements),
            "starting gap analysis"
        );

        let (coverage, trace, (contract, requirements)) = std::thread::scope(|s| {
            let coverage = s.spawn(|| sources.coverage.map(load_coverage).transpose());
            let trace = s.spawn(|| sources.trace.map(load_trace).transpose());
            let specification = s.spawn(|| {
                (
                    sources.contract.map(load_contract).transpose(),
                    sources.requirements.map(load_requirements).transpose(),
                )
            });
            Ok::<_, Error>((
                join(coverage, "coverage")?,
                join(trace, "trace")?,
                join(specification, "specification")?,
            ))
        })?;

        let tree = self.absorb(coverage, DiagnosticSource::Coverage, &mut diagnostics)?;
        let trace = self.absorb(trace, DiagnosticSource::Trace, &mut diagnostics)?;
        let contract = self.absorb(contract, DiagnosticSource::Contract, &mut diagnostics)?;
        let rules = self.absorb(requirements, DiagnosticSource::Requirements, &mut diagnostics)?;

        let endpoints = contract.endpoints;
        let rules = map_rules_to_endpoints(rules, &endpoints);
        let endpoint_coverage = trace.endpoint_coverage().reconcile(&endpoints);

        let code_gaps = self.classifier.code_gaps(&tree);
        let api_gaps = self.classifier.api_gaps(&endpoints, &endpoint_coverage);
        let business_rule_gaps = self.classifier.business_rule_gaps(&rules, &endpoint_coverage);
        info!(
            code = code_gaps.len(),
            api = api_gaps.len(),
            rules = business_rule_gaps.len(),
            "classified gaps"
        );

        let request = SuggestionRequest {
            code_gaps: &code_gaps,
            api_gaps: &api_gaps,
            business_rule_gaps: &business_rule_gaps,
            endpoint_catalog: &endpoints,
            rule_catalog: &rules,
        };
        let (scenarios, suggestion_source) = self.suggest(&request, &mut diagnostics);

        Ok(GapAnalysisResult {
            code_gaps,
            api_gaps,
            business_rule_gaps,
            scenarios,
            coverage_summary: tree.summary(),
            endpoint_coverage: endpoint_coverage.into_records(),
            trace_totals: trace.totals,
            diagnostics,
            suggestion_source,
            generated_at: Utc::now(),
            input_fingerprint: sources.fingerprint(),
        })
    }

    /// Degrade a malformed source to `None` when partial analysis is allowed
    fn settle<T>(
        &self,
        outcome: Result<T>,
        source: DiagnosticSource,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Option<T>> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(err @ Error::MalformedDocument { .. }) if self.allow_partial => {
                diagnostics.push(Diagnostic::new(
                    source,
                    DiagnosticKind::SourceSkipped,
                    err.to_string(),
                ));
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Settle one parse outcome; skipped sources contribute an empty model
    fn absorb<T: Default>(
        &self,
        outcome: Result<Option<Parsed<T>>>,
        source: DiagnosticSource,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<T> {
        match self.settle(outcome, source, diagnostics)?.flatten() {
            Some(parsed) => {
                diagnostics.extend(parsed.diagnostics);
                Ok(parsed.value)
            }
            None => Ok(T::default()),
        }
    }

    fn suggest(
        &self,
        request: &SuggestionRequest<'_>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> (Vec<TestScenario>, String) {
        let Some(provider) = &self.provider else {
            return synthesize(request);
        };

        match provider.generate(request) {
            Ok(scenarios) => {
                debug!(provider = provider.name(), scenarios = scenarios.len(), "received suggestions");
                (scenarios, provider.name().to_string())
            }
            Err(err) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticSource::Suggestions,
                    DiagnosticKind::CollaboratorFailure,
                    format!("{} provider failed: {}", provider.name(), err),
                ));
                match self.fallback {
                    SuggestionFallback::Deterministic => synthesize(request),
                    SuggestionFallback::None => (Vec::new(), "none".to_string()),
                }
            }
        }
    }
}

fn synthesize(request: &SuggestionRequest<'_>) -> (Vec<TestScenario>, String) {
    let synthesizer = DeterministicSynthesizer;
    let scenarios = synthesizer.generate(request).unwrap_or_default();
    (scenarios, synthesizer.name().to_string())
}

fn join<T>(handle: ScopedJoinHandle<'_, T>, label: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| Error::Other(format!("{} parser panicked", label)))
}

fn load_coverage(document: &SourceDocument) -> Result<Parsed<CoverageTree>> {
    let format = DocumentFormat::detect(&document.path, &document.content);
    let report = normalize_as(&document.content, format)
        .map_err(|e| Error::malformed(&document.path, e))?;
    let mut builder = CoverageTreeBuilder::new();
    let tree = builder.build(&report);
    Ok(Parsed {
        value: tree,
        diagnostics: builder.into_diagnostics(),
    })
}

fn load_trace(document: &SourceDocument) -> Result<Parsed<Trace>> {
    let format = DocumentFormat::detect(&document.path, &document.content);
    let report = normalize_as(&document.content, format)
        .map_err(|e| Error::malformed(&document.path, e))?;
    let mut parser = TraceParser::new();
    let trace = parser.parse(&report);
    Ok(Parsed {
        value: trace,
        diagnostics: parser.into_diagnostics(),
    })
}

fn load_contract(document: &SourceDocument) -> Result<Parsed<ApiContract>> {
    let format = DocumentFormat::detect(&document.path, &document.content);
    let normalized = normalize_as(&document.content, format)
        .map_err(|e| Error::malformed(&document.path, e))?;
    let contract = parse_contract(&normalized);

    let mut diagnostics = Vec::new();
    if contract.endpoints.is_empty() {
        diagnostics.push(Diagnostic::unrecognized(
            DiagnosticSource::Contract,
            "contract declares no endpoints",
        ));
    }
    Ok(Parsed {
        value: contract,
        diagnostics,
    })
}

fn load_requirements(document: &SourceDocument) -> Result<Parsed<Vec<BusinessRule>>> {
    let rules = extract_rules(&document.content);

    let mut diagnostics = Vec::new();
    if rules.is_empty() && !document.content.trim().is_empty() {
        diagnostics.push(Diagnostic::unrecognized(
            DiagnosticSource::Requirements,
            "no business rules found in requirements",
        ));
    }
    Ok(Parsed {
        value: rules,
        diagnostics,
    })
}
