use std::collections::HashSet;

use adless_core::ruleset::DomainConstraint;
use adless_core::types::{PartyMask, ResourceType, RuleAction, RuleFlags};

use crate::parser::{AnchorType, CompiledRule};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub badfilter_rules: usize,
    pub badfiltered_rules: usize,
}

/// Apply `$badfilter` cancellations and drop exact duplicates.
/// The relative order of surviving rules is unchanged.
pub fn optimize_rules(rules: &mut Vec<CompiledRule>) -> OptimizeStats {
    let before = rules.len();

    let badfilter_keys: HashSet<RuleKey> = rules
        .iter()
        .filter(|rule| rule.is_badfilter)
        .map(RuleKey::from)
        .collect();
    let badfilter_rules = rules.iter().filter(|rule| rule.is_badfilter).count();

    let mut badfiltered_rules = 0usize;
    rules.retain(|rule| {
        if rule.is_badfilter {
            return false;
        }
        if badfilter_keys.contains(&RuleKey::from(rule)) {
            log::debug!("rule cancelled by $badfilter: {}", rule.raw);
            badfiltered_rules += 1;
            return false;
        }
        true
    });

    let mut seen: HashSet<RuleKey> = HashSet::new();
    let mut duplicates = vec![false; rules.len()];
    for (index, rule) in rules.iter().enumerate() {
        if !seen.insert(RuleKey::from(rule)) {
            duplicates[index] = true;
        }
    }
    let deduped = duplicates.iter().filter(|&&dup| dup).count();
    let mut flags = duplicates.into_iter();
    rules.retain(|_| !flags.next().unwrap_or(false));

    OptimizeStats {
        before,
        after: rules.len(),
        deduped,
        badfilter_rules,
        badfiltered_rules,
    }
}

/// Everything that affects matching. The raw text, the list id and the
/// `$badfilter` marker do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    action: RuleAction,
    flags: RuleFlags,
    host: Option<String>,
    pattern: Option<String>,
    anchor_type: AnchorType,
    right_anchor: bool,
    scope: ResourceType,
    party: PartyMask,
    domain_constraints: Option<DomainConstraint>,
    redirect: Option<String>,
    csp: Option<String>,
}

impl From<&CompiledRule> for RuleKey {
    fn from(rule: &CompiledRule) -> Self {
        let mut domain_constraints = rule.domain_constraints.clone();
        if let Some(constraint) = domain_constraints.as_mut() {
            constraint.include.sort();
            constraint.exclude.sort();
        }
        let pattern = if rule.flags.contains(RuleFlags::MATCH_CASE) {
            rule.pattern.clone()
        } else {
            rule.pattern.as_ref().map(|p| p.to_ascii_lowercase())
        };
        Self {
            action: rule.action,
            flags: rule.flags,
            host: rule.host.clone(),
            pattern,
            anchor_type: rule.anchor_type,
            right_anchor: rule.right_anchor,
            scope: rule.scope,
            party: rule.party,
            domain_constraints,
            redirect: rule.redirect.clone(),
            csp: rule.csp.clone(),
        }
    }
}
