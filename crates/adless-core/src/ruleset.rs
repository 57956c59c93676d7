//! Compiled rule set
//!
//! A [`RuleSet`] is built once by the compiler and then shared read-only by
//! every request. Rules are stored in list order; the indices below only
//! narrow down which rules need verifying for a given URL.
//!
//! - hostname-only rules (`||ads.example.com^`, hosts-file lines) are keyed by host
//!   and found by walking the reference host's suffixes
//! - pattern rules are keyed by one token that must appear as a whole
//!   alphanumeric run in any URL they match
//! - everything else sits in an unindexed list that is always verified

use std::collections::HashMap;

use crate::pattern::Pattern;
use crate::psl::{host_matches_domain, walk_host_suffixes};
use crate::types::{PartyMask, ResourceType, RuleAction, RuleFlags};

// =============================================================================
// Rules
// =============================================================================

/// `$domain=` constraint on the document host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DomainConstraint {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl DomainConstraint {
    /// Whether the document host satisfies the constraint.
    pub fn allows(&self, document_host: &str) -> bool {
        if !self.include.is_empty()
            && !self.include.iter().any(|d| host_matches_domain(document_host, d))
        {
            return false;
        }
        !self.exclude.iter().any(|d| host_matches_domain(document_host, d))
    }
}

/// How a rule recognizes a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleMatcher {
    /// Matches the host or any of its subdomains
    Host(String),
    /// Matches a compiled pattern
    Pattern(Pattern),
    /// Matches every URL (option-only rules such as `@@$csp` or `$csp=...`)
    Any,
}

impl RuleMatcher {
    /// `url_lower` must be `url.to_ascii_lowercase()`; `host` is taken from it.
    pub fn matches(&self, url: &str, url_lower: &str, host: &str) -> bool {
        match self {
            RuleMatcher::Host(domain) => host_matches_domain(host, domain),
            RuleMatcher::Pattern(pattern) => pattern.matches(url, url_lower),
            RuleMatcher::Any => true,
        }
    }
}

/// A single compiled block-list entry. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Raw line the rule came from
    pub raw: String,
    pub action: RuleAction,
    pub flags: RuleFlags,
    pub matcher: RuleMatcher,
    pub list_id: u16,
    /// Empty means any scope
    pub scope: ResourceType,
    /// Empty means any party
    pub party: PartyMask,
    pub domains: Option<DomainConstraint>,
    /// Redirect target (already mapped to a URL)
    pub redirect: Option<String>,
    /// CSP directive for `$csp=` rules; `None` on a CSP exception disables all
    pub csp: Option<String>,
}

impl Rule {
    /// Scope, party and `$domain=` checks.
    pub fn applies_to(&self, scope: ResourceType, third_party: bool, document_host: &str) -> bool {
        if !self.scope.is_empty() && !self.scope.intersects(scope) {
            return false;
        }

        if !self.party.is_empty() {
            let party = if third_party {
                PartyMask::THIRD_PARTY
            } else {
                PartyMask::FIRST_PARTY
            };
            if !self.party.intersects(party) {
                return false;
            }
        }

        match &self.domains {
            Some(constraint) => constraint.allows(document_host),
            None => true,
        }
    }

    pub fn is_important(&self) -> bool {
        self.flags.contains(RuleFlags::IMPORTANT)
    }
}

/// Element-hiding rule (`##selector`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CosmeticRule {
    pub selector: String,
    /// Sites the rule is limited to; empty means generic
    pub include: Vec<String>,
    /// Sites excluded with `~`
    pub exclude: Vec<String>,
    /// `#@#` exception
    pub exception: bool,
}

impl CosmeticRule {
    pub fn is_generic(&self) -> bool {
        self.include.is_empty()
    }

    pub fn applies_to(&self, host: &str) -> bool {
        if self.exclude.iter().any(|d| host_matches_domain(host, d)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|d| host_matches_domain(host, d))
    }
}

// =============================================================================
// Index
// =============================================================================

/// Lookup structures filled by the compiler's builder.
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    hosts: HashMap<String, Vec<usize>>,
    tokens: HashMap<String, Vec<usize>>,
    unindexed: Vec<usize>,
    document: Vec<usize>,
}

impl RuleIndex {
    pub fn insert_host(&mut self, host: &str, rule_id: usize) {
        self.hosts.entry(host.to_string()).or_default().push(rule_id);
    }

    pub fn insert_token(&mut self, token: &str, rule_id: usize) {
        self.tokens.entry(token.to_string()).or_default().push(rule_id);
    }

    pub fn insert_unindexed(&mut self, rule_id: usize) {
        self.unindexed.push(rule_id);
    }

    /// Rules evaluated only against the document URL (`$csp`, `$elemhide`, `$generichide`).
    pub fn insert_document(&mut self, rule_id: usize) {
        self.document.push(rule_id);
    }

    /// Number of rules already keyed by a token.
    pub fn token_count(&self, token: &str) -> usize {
        self.tokens.get(token).map_or(0, Vec::len)
    }

    pub fn host_keys(&self) -> usize {
        self.hosts.len()
    }

    pub fn token_keys(&self) -> usize {
        self.tokens.len()
    }

    pub fn unindexed_len(&self) -> usize {
        self.unindexed.len()
    }
}

// =============================================================================
// Rule Set
// =============================================================================

/// Immutable, shareable set of compiled rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    index: RuleIndex,
    cosmetics: Vec<CosmeticRule>,
    cosmetic_sites: HashMap<String, Vec<usize>>,
    cosmetic_generic: Vec<usize>,
}

impl RuleSet {
    /// An empty set: everything is allowed unless a built-in signature matches.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(rules: Vec<Rule>, index: RuleIndex, cosmetics: Vec<CosmeticRule>) -> Self {
        let mut cosmetic_sites: HashMap<String, Vec<usize>> = HashMap::new();
        let mut cosmetic_generic = Vec::new();

        for (id, rule) in cosmetics.iter().enumerate() {
            if rule.is_generic() {
                cosmetic_generic.push(id);
            } else {
                for site in &rule.include {
                    cosmetic_sites.entry(site.clone()).or_default().push(id);
                }
            }
        }

        Self {
            rules,
            index,
            cosmetics,
            cosmetic_sites,
            cosmetic_generic,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.cosmetics.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, rule_id: usize) -> Option<&Rule> {
        self.rules.get(rule_id)
    }

    pub fn index(&self) -> &RuleIndex {
        &self.index
    }

    pub fn cosmetics(&self) -> &[CosmeticRule] {
        &self.cosmetics
    }

    /// Rule ids worth verifying for a lowercased URL: indexed hits (ascending, unique),
    /// then the unindexed list, which never overlaps them.
    pub fn candidates(&self, url_lower: &str, host: &str, tokens: &[&str]) -> (Vec<usize>, &[usize]) {
        let mut ids: Vec<usize> = Vec::new();

        for suffix in walk_host_suffixes(host) {
            if let Some(list) = self.index.hosts.get(suffix) {
                ids.extend_from_slice(list);
            }
        }

        if !url_lower.is_empty() {
            for token in tokens {
                if let Some(list) = self.index.tokens.get(*token) {
                    ids.extend_from_slice(list);
                }
            }
        }

        ids.sort_unstable();
        ids.dedup();
        (ids, &self.index.unindexed)
    }

    /// Document-level rule ids, ascending.
    pub fn document_rules(&self) -> &[usize] {
        &self.index.document
    }

    /// Cosmetic rule ids that may apply to a host (site-specific first, then generic).
    pub fn cosmetic_candidates(&self, host: &str) -> (Vec<usize>, &[usize]) {
        let mut specific = Vec::new();
        for suffix in walk_host_suffixes(host) {
            if let Some(list) = self.cosmetic_sites.get(suffix) {
                specific.extend_from_slice(list);
            }
        }
        specific.sort_unstable();
        specific.dedup();
        (specific, &self.cosmetic_generic)
    }
}
