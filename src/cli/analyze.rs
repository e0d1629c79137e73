//! The `analyze` command

use super::util::{has_flag, parse_flag_value, parse_output_arg, require_flag_value, write_output};
use covgap::*;
use std::path::Path;

const USAGE: &str = "covgap analyze --coverage <f> --trace <f> --contract <f> --requirements <f> \
                     [--json] [--output <f>] [--config <f>] [--allow-partial] \
                     [--full-thresholds] [--suggest-cmd <program>]";

pub fn cmd_analyze(args: &[String]) -> Result<()> {
    let inputs = AnalysisInputs {
        coverage: require_flag_value(args, "--coverage", USAGE)?,
        trace: require_flag_value(args, "--trace", USAGE)?,
        contract: require_flag_value(args, "--contract", USAGE)?,
        requirements: require_flag_value(args, "--requirements", USAGE)?,
    };
    let json_output = has_flag(args, "--json");
    let output = parse_output_arg(args);

    let config = resolve_config(args)?;
    let analyzer = Analyzer::from_config(&config);
    let result = analyzer.analyze_files(&inputs)?;

    let content = if json_output {
        serde_json::to_string_pretty(&result)?
    } else {
        result.to_report()
    };
    write_output(&output, &content)
}

/// Config file (explicit or `./covgap.yaml`) with command-line overrides applied
fn resolve_config(args: &[String]) -> Result<CovgapConfig> {
    let mut config = match parse_flag_value(args, "--config") {
        Some(path) => CovgapConfig::load(Path::new(&path))?,
        None => {
            let current_dir = std::env::current_dir().map_err(Error::Io)?;
            CovgapConfig::load_from_dir(&current_dir)?.unwrap_or_default()
        }
    };

    if has_flag(args, "--allow-partial") {
        config.allow_partial = true;
    }
    if has_flag(args, "--full-thresholds") {
        config.full_threshold_table = true;
    }
    if let Some(command) = parse_flag_value(args, "--suggest-cmd") {
        config.suggestions.command = Some(command);
    }
    Ok(config)
}
