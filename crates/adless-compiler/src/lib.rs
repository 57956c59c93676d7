//! Adless Rule Compiler
//!
//! Compiles ABP-style block lists (plus hosts files) into an immutable
//! [`RuleSet`]. Malformed lines are skipped and reported; they never abort
//! compilation of the rest of the list.

pub mod builder;
pub mod optimizer;
pub mod parser;
pub mod resources;

use adless_core::ruleset::RuleSet;

pub use builder::build_rule_set;
pub use optimizer::optimize_rules;
pub use parser::{parse_filter_list, CompiledRule, MalformedRule, RuleSyntaxError};

/// Per-compilation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Lines read across all lists
    pub lines: usize,
    /// Network rules in the final set
    pub rules: usize,
    /// Cosmetic rules in the final set
    pub cosmetic: usize,
    /// Valid but unsupported lines
    pub skipped: usize,
    /// Rules removed by `$badfilter` (the `$badfilter` lines included)
    pub badfiltered: usize,
    /// Exact duplicates removed
    pub deduped: usize,
    pub malformed: Vec<MalformedRule>,
}

#[derive(Debug)]
pub struct Compilation {
    pub rule_set: RuleSet,
    pub report: CompileReport,
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("no valid rules: all {} rule lines were malformed", malformed.len())]
    NoValidRules { malformed: Vec<MalformedRule> },
}

/// Compile a single block list.
pub fn compile(text: &str) -> Result<Compilation, CompileError> {
    compile_lists(&[(0, text)])
}

/// Compile several lists into one set, tagging rules with their list id.
pub fn compile_lists(lists: &[(u16, &str)]) -> Result<Compilation, CompileError> {
    let mut report = CompileReport::default();
    let mut rules = Vec::new();
    let mut cosmetics = Vec::new();

    for &(list_id, text) in lists {
        let parsed = parse_filter_list(text, list_id);
        report.lines += parsed.lines;
        report.skipped += parsed.skipped;
        report.malformed.extend(parsed.malformed);
        rules.extend(parsed.rules);
        cosmetics.extend(parsed.cosmetics);
    }

    let stats = optimize_rules(&mut rules);
    report.badfiltered = stats.badfilter_rules + stats.badfiltered_rules;
    report.deduped = stats.deduped;

    let before = cosmetics.len();
    let mut seen = std::collections::HashSet::new();
    cosmetics.retain(|rule| seen.insert(rule.clone()));
    report.deduped += before - cosmetics.len();

    report.rules = rules.len();
    report.cosmetic = cosmetics.len();

    if report.rules == 0 && report.cosmetic == 0 && !report.malformed.is_empty() {
        return Err(CompileError::NoValidRules {
            malformed: report.malformed,
        });
    }

    let rule_set = build_rule_set(&rules, cosmetics);
    log::info!(
        "compiled {} network and {} cosmetic rules from {} lines ({} malformed, {} skipped)",
        report.rules,
        report.cosmetic,
        report.lines,
        report.malformed.len(),
        report.skipped
    );

    Ok(Compilation { rule_set, report })
}
