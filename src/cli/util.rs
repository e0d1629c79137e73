//! CLI utility helpers

use covgap::normalize::{normalize_as, DocumentFormat, Node};
use covgap::{Error, Result, SourceDocument};
use std::fs;
use std::path::{Path, PathBuf};

/// Value following `flag`, if present
pub fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for (i, arg) in args.iter().enumerate() {
        if arg == flag {
            if let Some(value) = args.get(i + 1) {
                return Some(value.clone());
            }
        }
    }
    None
}

/// Value following `flag`, or a usage error
pub fn require_flag_value(args: &[String], flag: &str, usage: &str) -> Result<PathBuf> {
    parse_flag_value(args, flag)
        .map(PathBuf::from)
        .ok_or_else(|| Error::Other(format!("Missing {}\nUsage: {}", flag, usage)))
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Parse --output argument to determine output file path
pub fn parse_output_arg(args: &[String]) -> Option<PathBuf> {
    parse_flag_value(args, "--output")
        .or_else(|| parse_flag_value(args, "-o"))
        .map(PathBuf::from)
}

/// Read and normalize a structured report, keeping its path on failure
pub fn load_node(path: &str) -> Result<Node> {
    let document = SourceDocument::read(Path::new(path))?;
    let format = DocumentFormat::detect(&document.path, &document.content);
    normalize_as(&document.content, format).map_err(|e| Error::malformed(&document.path, e))
}

/// Write content to file or stdout
pub fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content).map_err(Error::Io)?;
            eprintln!("Written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
