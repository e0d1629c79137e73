//! CLI command implementations
//!
//! - `analyze`: full gap analysis
//! - `inspect`: single-source commands (coverage, trace, rules)
//! - `schema`: JSON schema output
//! - `util`: shared argument and output helpers

pub mod analyze;
pub mod inspect;
pub mod schema;
pub mod util;

pub use analyze::cmd_analyze;
pub use inspect::{cmd_coverage, cmd_rules, cmd_trace};
pub use schema::cmd_schema;
