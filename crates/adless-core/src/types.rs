//! Core type definitions for adless
//!
//! These types are shared between the rule compiler, the matcher and
//! the document rewriter.

// =============================================================================
// Rule Actions
// =============================================================================

/// Action to take for a matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuleAction {
    /// Exception rule (@@...) - allows the reference
    Allow = 0,
    /// Block rule - removes the owning element
    Block = 1,
    /// Redirect directive (redirect-rule=) - redirects references blocked by another rule
    RedirectDirective = 2,
    /// Emit a CSP directive for the document
    CspInject = 3,
}

impl TryFrom<u8> for RuleAction {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Allow),
            1 => Ok(Self::Block),
            2 => Ok(Self::RedirectDirective),
            3 => Ok(Self::CspInject),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Rule Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleFlags: u16 {
        /// $important - ignores exception filters
        const IMPORTANT = 1 << 0;
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 1;
        /// Created by $redirect= (block part carries the target)
        const FROM_REDIRECT_EQ = 1 << 2;
        /// Rule has right anchor (ends with | or $)
        const HAS_RIGHT_ANCHOR = 1 << 3;
        /// Rule has hostname anchor (||)
        const HAS_HOST_ANCHOR = 1 << 4;
        /// Rule has left anchor (starts with |)
        const HAS_LEFT_ANCHOR = 1 << 5;
        /// @@...$elemhide - disables all cosmetic filtering on the document
        const ELEMHIDE = 1 << 6;
        /// @@...$generichide - disables generic cosmetic filtering on the document
        const GENERICHIDE = 1 << 7;
        /// @@...$csp[=...] - CSP exception
        const CSP_EXCEPTION = 1 << 8;
    }
}

// =============================================================================
// Resource Types (element scope)
// =============================================================================

bitflags::bitflags! {
    /// Scope of a reference: which kind of resource the owning element loads.
    ///
    /// An empty mask on a rule means "any scope".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const DOCUMENT = 1 << 6;     // the proxied document itself
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;

        /// All resource types
        const ALL = 0x0FFF;
    }
}

impl ResourceType {
    /// Parse from a scope name as used on the command line.
    pub fn from_option_name(s: &str) -> Option<Self> {
        let scope = match s {
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "stylesheet" | "css" => Self::STYLESHEET,
            "object" | "object-subrequest" => Self::OBJECT,
            "subdocument" | "sub_frame" | "frame" => Self::SUBDOCUMENT,
            "document" | "main_frame" | "doc" => Self::DOCUMENT,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "websocket" => Self::WEBSOCKET,
            "font" => Self::FONT,
            "media" => Self::MEDIA,
            "ping" | "beacon" => Self::PING,
            "other" => Self::OTHER,
            _ => return None,
        };
        Some(scope)
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party references
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party references
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Match Context
// =============================================================================

/// Context for a reference being matched.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// Absolute (resolved) reference URL
    pub url: &'a str,
    /// Scope of the owning element
    pub scope: ResourceType,
    /// Hostname of the document the reference appears in
    pub document_host: &'a str,
}

// =============================================================================
// Match Result
// =============================================================================

/// Final decision for a matched reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision {
    /// Reference is allowed (no matching block rules, or exception matched)
    Allow,
    /// Reference is blocked; the owning element is removed
    Block,
    /// Reference is replaced by the given target
    Redirect(String),
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// Nothing matched
    Default,
    /// An exception (@@) rule matched
    Exception,
    /// A block or redirect rule matched
    Rule,
    /// A built-in signature matched
    Signature,
}

/// Result of matching a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The final decision for this reference
    pub decision: MatchDecision,
    /// Index of the rule that determined the decision (for logging)
    pub rule_id: Option<usize>,
    /// What produced the decision
    pub source: MatchSource,
}

impl MatchResult {
    pub fn is_blocked(&self) -> bool {
        self.decision == MatchDecision::Block
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self {
            decision: MatchDecision::Allow,
            rule_id: None,
            source: MatchSource::Default,
        }
    }
}
