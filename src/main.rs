//! covgap CLI - Command-line interface
//!
//! Commands:
//!   analyze   - Full reconciliation and gap analysis
//!   coverage  - Summarize a coverage report
//!   trace     - Endpoint coverage from an execution trace
//!   rules     - Extract business rules from requirements
//!   schema    - JSON schema for output types

mod cli;

use covgap::{Result, VERSION};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let verbose = args[2..].iter().any(|a| a == "-v" || a == "--verbose");
    covgap::logging::init_logging(verbose);

    let result: Result<()> = match args[1].as_str() {
        "analyze" => cli::cmd_analyze(&args[2..]),
        "coverage" => cli::cmd_coverage(&args[2..]),
        "trace" => cli::cmd_trace(&args[2..]),
        "rules" => cli::cmd_rules(&args[2..]),
        "schema" => cli::cmd_schema(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("covgap {}", VERSION);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            Err("Unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    println!(
        r#"
covgap - Coverage reconciliation and gap analysis

USAGE:
    covgap <COMMAND> [OPTIONS]

COMMANDS:
    analyze                           Reconcile all sources and report gaps
        --coverage <jacoco.xml>
        --trace <cucumber.json>
        --contract <openapi.json>
        --requirements <requirements.md>
    coverage <report.xml>             Summarize a coverage report
    trace <report.json>               Endpoint coverage from an execution trace
        [--contract <openapi.json>]     Reconcile against a contract
    rules <requirements.md>           Extract business rules
        [--contract <openapi.json>]     Map rules to contract endpoints
    schema [result|config]            Print JSON schema
    version                           Print version

OPTIONS:
    --json                            JSON output format
    --output <file>                   Output file (default: stdout)
    --config <covgap.yaml>            Config file (default: ./covgap.yaml if present)
    --allow-partial                   Skip malformed sources instead of failing
    --full-thresholds                 Also check INSTRUCTION and CLASS coverage
    --suggest-cmd <program>           External scenario suggestion program
    -v, --verbose                     Debug logging on stderr (RUST_LOG overrides)

EXAMPLES:
    covgap analyze --coverage target/site/jacoco/jacoco.xml \
        --trace target/cucumber.json --contract api/openapi.json \
        --requirements docs/requirements.md
    covgap coverage target/site/jacoco/jacoco.xml --json
    covgap rules docs/requirements.md --contract api/openapi.yaml
"#
    );
}
