//! Rule loading and lookup.
//!
//! Rule sets are declarative JSON files, one per compliance framework,
//! validated against an embedded JSON Schema at load time.

mod parser;
mod repository;

pub use parser::{framework_name_from_path, FrameworkRules, Rule, RuleLoadError, Severity};
pub use repository::{RuleFileFailure, RuleLoadReport, RuleSet};
