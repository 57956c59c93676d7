//! Adless Core Library
//!
//! Shared building blocks of the adless content proxy: URL resolution
//! against the requested page, compiled rule sets and the filter matcher
//! consulted for every reference in a document.
//!
//! # Modules
//!
//! - `resolve`: origin parsing and root-relative / protocol-relative resolution
//! - `psl`: eTLD+1 extraction for party checks and host suffix walks
//! - `url`: fast URL slicing and tokenization
//! - `pattern`: compiled block-list patterns
//! - `ruleset`: immutable rule set and its indices
//! - `matcher`: precedence, CSP and cosmetic decisions
//! - `signatures`: built-in fallback signatures
//! - `store`: atomically published rule set
//! - `types`: shared type definitions

pub mod matcher;
pub mod pattern;
pub mod psl;
pub mod resolve;
pub mod ruleset;
pub mod signatures;
pub mod store;
pub mod types;
pub mod url;

pub use matcher::{ElementHiding, HidingExceptions, Matcher};
pub use psl::{get_etld1, is_third_party};
pub use resolve::{resolve, rewrite_css_urls, Origin, Resolution, UrlError};
pub use ruleset::{CosmeticRule, DomainConstraint, Rule, RuleIndex, RuleMatcher, RuleSet};
pub use store::RuleStore;
pub use types::{MatchContext, MatchDecision, MatchResult, MatchSource, PartyMask, ResourceType, RuleAction, RuleFlags};
