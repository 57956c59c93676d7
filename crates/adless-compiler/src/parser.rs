use std::net::IpAddr;

use adless_core::ruleset::{CosmeticRule, DomainConstraint};
use adless_core::types::{PartyMask, ResourceType, RuleAction, RuleFlags};

use crate::resources::redirect_target;

/// Why a rule line could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleSyntaxError {
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("option `{0}` is not allowed on this rule")]
    InvalidOption(String),
    #[error("option `{0}` requires a value")]
    MissingValue(String),
    #[error("options exclude every resource type")]
    EmptyTypeMask,
    #[error("empty pattern")]
    EmptyPattern,
    #[error("pattern has no literal characters")]
    NoLiteral,
    #[error("misplaced `|` in pattern")]
    MisplacedPipe,
    #[error("whitespace inside pattern")]
    Whitespace,
    #[error("empty domain entry")]
    EmptyDomain,
    #[error("invalid domain `{0}`")]
    InvalidDomain(String),
    #[error("invalid selector")]
    InvalidSelector,
}

/// A rule line that was skipped because it could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}: `{text}`")]
pub struct MalformedRule {
    /// 1-based line number within its list
    pub line: usize,
    pub text: String,
    pub reason: RuleSyntaxError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnchorType {
    #[default]
    None,
    Left,
    Hostname,
}

/// A parsed network rule, before indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub raw: String,
    pub action: RuleAction,
    pub flags: RuleFlags,
    /// Set for hostname-only rules (`||host^`, hosts-file lines)
    pub host: Option<String>,
    /// Pattern body without anchors; `None` when the rule matches every URL
    pub pattern: Option<String>,
    pub anchor_type: AnchorType,
    pub right_anchor: bool,
    pub list_id: u16,
    pub scope: ResourceType,
    pub party: PartyMask,
    pub domain_constraints: Option<DomainConstraint>,
    /// Redirect target URL
    pub redirect: Option<String>,
    pub csp: Option<String>,
    pub is_badfilter: bool,
}

impl CompiledRule {
    fn hostname(raw: &str, host: String) -> Self {
        Self {
            raw: raw.to_string(),
            action: RuleAction::Block,
            flags: RuleFlags::HAS_HOST_ANCHOR,
            host: Some(host),
            pattern: None,
            anchor_type: AnchorType::Hostname,
            right_anchor: false,
            list_id: 0,
            scope: ResourceType::empty(),
            party: PartyMask::empty(),
            domain_constraints: None,
            redirect: None,
            csp: None,
            is_badfilter: false,
        }
    }

    /// Rules evaluated against the document itself rather than its references.
    pub fn is_document_level(&self) -> bool {
        self.action == RuleAction::CspInject
            || self.flags.intersects(RuleFlags::ELEMHIDE | RuleFlags::GENERICHIDE)
            || (self.action == RuleAction::Allow && self.scope.contains(ResourceType::DOCUMENT))
    }
}

/// Outcome of parsing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// Blank line or comment
    Empty,
    Network(CompiledRule),
    Cosmetic(CosmeticRule),
    /// Valid syntax this engine does not implement
    Unsupported(String),
}

#[derive(Debug, Default)]
pub struct ParsedList {
    pub rules: Vec<CompiledRule>,
    pub cosmetics: Vec<CosmeticRule>,
    pub lines: usize,
    pub skipped: usize,
    pub malformed: Vec<MalformedRule>,
}

pub fn parse_filter_list(text: &str, list_id: u16) -> ParsedList {
    let mut parsed = ParsedList::default();

    for (index, raw_line) in text.lines().enumerate() {
        parsed.lines += 1;
        match parse_line(raw_line) {
            Ok(ParsedLine::Empty) => {}
            Ok(ParsedLine::Network(mut rule)) => {
                rule.list_id = list_id;
                parsed.rules.push(rule);
            }
            Ok(ParsedLine::Cosmetic(rule)) => parsed.cosmetics.push(rule),
            Ok(ParsedLine::Unsupported(what)) => {
                parsed.skipped += 1;
                log::debug!("list {} line {}: skipping {}: {}", list_id, index + 1, what, raw_line.trim());
            }
            Err(reason) => {
                let malformed = MalformedRule {
                    line: index + 1,
                    text: raw_line.trim().to_string(),
                    reason,
                };
                log::warn!("list {}: {}", list_id, malformed);
                parsed.malformed.push(malformed);
            }
        }
    }

    parsed
}

pub fn parse_line(raw_line: &str) -> Result<ParsedLine, RuleSyntaxError> {
    let line = raw_line.trim();
    if line.is_empty() || line.starts_with('!') || line.starts_with('[') {
        return Ok(ParsedLine::Empty);
    }

    if let Some((pos, separator)) = find_cosmetic_separator(line) {
        return parse_cosmetic(line, pos, separator);
    }

    if line.starts_with('#') {
        return Ok(ParsedLine::Empty);
    }

    let mut words = line.split_whitespace();
    if let Some(first) = words.next() {
        if first.parse::<IpAddr>().is_ok() {
            return parse_hosts_entry(line, words.next());
        }
    }

    parse_network(line)
}

// =============================================================================
// Network rules
// =============================================================================

const LOCAL_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "0.0.0.0",
];

fn parse_hosts_entry(line: &str, name: Option<&str>) -> Result<ParsedLine, RuleSyntaxError> {
    let name = match name {
        Some(name) if !name.starts_with('#') => name,
        _ => return Ok(ParsedLine::Empty),
    };
    if LOCAL_HOSTNAMES.contains(&name.to_ascii_lowercase().as_str()) {
        return Ok(ParsedLine::Empty);
    }

    let host = normalize_domain(name).ok_or_else(|| RuleSyntaxError::InvalidDomain(name.to_string()))?;
    Ok(ParsedLine::Network(CompiledRule::hostname(line, host)))
}

fn parse_network(line: &str) -> Result<ParsedLine, RuleSyntaxError> {
    let (mut action, body) = match line.strip_prefix("@@") {
        Some(rest) => (RuleAction::Allow, rest),
        None => (RuleAction::Block, line),
    };

    if is_regex_rule(body) {
        return Ok(ParsedLine::Unsupported("regex rule".to_string()));
    }

    let (pattern_part, options_text, dollar_anchor) = split_rule_options(body);
    let options = match options_text {
        Some(text) => parse_options(text)?,
        None => ParsedOptions::default(),
    };
    if let Some(option) = options.unsupported {
        return Ok(ParsedLine::Unsupported(format!("option `{}`", option)));
    }

    let mut flags = options.flags;
    if action != RuleAction::Allow {
        if flags.contains(RuleFlags::ELEMHIDE) {
            return Err(RuleSyntaxError::InvalidOption("elemhide".to_string()));
        }
        if flags.contains(RuleFlags::GENERICHIDE) {
            return Err(RuleSyntaxError::InvalidOption("generichide".to_string()));
        }
        if options.scope == ResourceType::DOCUMENT {
            return Ok(ParsedLine::Unsupported("document blocking".to_string()));
        }
    }

    let mut csp = None;
    if let Some(value) = options.csp {
        match (action, value) {
            (RuleAction::Block, None) => return Err(RuleSyntaxError::MissingValue("csp".to_string())),
            (RuleAction::Block, Some(value)) => csp = Some(value),
            (_, value) => {
                flags |= RuleFlags::CSP_EXCEPTION;
                csp = value;
            }
        }
        action = RuleAction::CspInject;
    }

    let mut redirect = None;
    if let Some(option) = options.redirect {
        if action != RuleAction::Block {
            return Ok(ParsedLine::Unsupported("redirect exception".to_string()));
        }
        match redirect_target(&option.name) {
            Some(target) => {
                redirect = Some(target);
                if option.rule_only {
                    action = RuleAction::RedirectDirective;
                } else {
                    flags |= RuleFlags::FROM_REDIRECT_EQ;
                }
            }
            None if option.rule_only => {
                return Ok(ParsedLine::Unsupported(format!("redirect resource `{}`", option.name)));
            }
            None => {
                log::debug!("unknown redirect resource `{}`, keeping plain block: {}", option.name, line);
            }
        }
    }

    let pattern = parse_pattern(pattern_part, dollar_anchor)?;
    if pattern.right_anchor {
        flags |= RuleFlags::HAS_RIGHT_ANCHOR;
    }
    match pattern.anchor_type {
        AnchorType::Left => flags |= RuleFlags::HAS_LEFT_ANCHOR,
        AnchorType::Hostname => flags |= RuleFlags::HAS_HOST_ANCHOR,
        AnchorType::None => {}
    }

    let mut rule = CompiledRule {
        raw: line.to_string(),
        action,
        flags,
        host: pattern.host,
        pattern: Some(pattern.body),
        anchor_type: pattern.anchor_type,
        right_anchor: pattern.right_anchor,
        list_id: 0,
        scope: options.scope,
        party: options.party,
        domain_constraints: options.domain_constraints,
        redirect,
        csp,
        is_badfilter: options.badfilter,
    };

    if rule.host.is_some() {
        rule.pattern = None;
        return Ok(ParsedLine::Network(rule));
    }

    let body = rule.pattern.as_deref().unwrap_or_default();
    let has_literal = body.bytes().any(|b| b != b'*' && b != b'^');
    if !has_literal {
        if !rule.is_document_level() {
            return Err(if body.is_empty() {
                RuleSyntaxError::EmptyPattern
            } else {
                RuleSyntaxError::NoLiteral
            });
        }
        rule.pattern = None;
    }

    Ok(ParsedLine::Network(rule))
}

fn is_regex_rule(body: &str) -> bool {
    body.len() > 2
        && body.starts_with('/')
        && (body.ends_with('/') || body.rfind("/$").is_some_and(|pos| pos > 0))
}

/// Splits `pattern$options`. A `$` with nothing after it is an end anchor.
fn split_rule_options(body: &str) -> (&str, Option<&str>, bool) {
    match body.rfind('$') {
        Some(pos) if pos + 1 == body.len() => (&body[..pos], None, true),
        Some(pos) => (&body[..pos], Some(&body[pos + 1..]), false),
        None => (body, None, false),
    }
}

struct ParsedPattern {
    body: String,
    anchor_type: AnchorType,
    right_anchor: bool,
    host: Option<String>,
}

fn parse_pattern(text: &str, dollar_anchor: bool) -> Result<ParsedPattern, RuleSyntaxError> {
    if text.chars().any(char::is_whitespace) {
        return Err(RuleSyntaxError::Whitespace);
    }

    let (anchor_type, rest) = if let Some(rest) = text.strip_prefix("||") {
        (AnchorType::Hostname, rest)
    } else if let Some(rest) = text.strip_prefix('|') {
        (AnchorType::Left, rest)
    } else {
        (AnchorType::None, text)
    };

    let (rest, pipe_anchor) = match rest.strip_suffix('|') {
        Some(rest) => (rest, true),
        None => (rest, false),
    };

    if rest.contains('|') {
        return Err(RuleSyntaxError::MisplacedPipe);
    }

    let right_anchor = pipe_anchor || dollar_anchor;
    let host = if anchor_type == AnchorType::Hostname && !right_anchor {
        parse_host_anchor_rule(rest)
    } else {
        None
    };

    Ok(ParsedPattern {
        body: rest.to_string(),
        anchor_type,
        right_anchor,
        host,
    })
}

/// `example.com^` after a `||` anchor.
fn parse_host_anchor_rule(rest: &str) -> Option<String> {
    let host = rest.strip_suffix('^')?;
    let host = host.strip_prefix('.').unwrap_or(host);
    if host.contains(['/', '^', '*', ':', '?', '#', '=']) {
        return None;
    }
    normalize_domain(host)
}

// =============================================================================
// Options
// =============================================================================

/// Options recognized but not implemented; rules using them are skipped.
const UNSUPPORTED_OPTIONS: &[&str] = &[
    "popup",
    "popunder",
    "removeparam",
    "queryprune",
    "header",
    "permissions",
    "replace",
    "urlskip",
    "urltransform",
    "denyallow",
    "to",
    "method",
    "all",
    "cname",
    "inline-script",
    "inline-font",
    "strict1p",
    "strict3p",
    "strict-first-party",
    "strict-third-party",
    "genericblock",
    "specifichide",
    "shide",
    "webrtc",
    "rewrite",
    "sitekey",
    "empty",
    "mp4",
    "uritransform",
    "ipaddress",
    "reason",
];

struct RedirectOption {
    name: String,
    rule_only: bool,
}

struct ParsedOptions {
    flags: RuleFlags,
    scope: ResourceType,
    party: PartyMask,
    domain_constraints: Option<DomainConstraint>,
    redirect: Option<RedirectOption>,
    /// `Some(None)` is a bare `csp` (exceptions only)
    csp: Option<Option<String>>,
    badfilter: bool,
    unsupported: Option<String>,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            flags: RuleFlags::empty(),
            scope: ResourceType::empty(),
            party: PartyMask::empty(),
            domain_constraints: None,
            redirect: None,
            csp: None,
            badfilter: false,
            unsupported: None,
        }
    }
}

fn parse_options(text: &str) -> Result<ParsedOptions, RuleSyntaxError> {
    let mut options = ParsedOptions::default();
    let mut type_include = 0u32;
    let mut type_exclude = 0u32;
    let mut party_include = 0u8;
    let mut party_exclude = 0u8;

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (name, value) = match raw.split_once('=') {
            Some((name, value)) => (name.trim().to_ascii_lowercase(), Some(value.trim())),
            None => (raw.to_ascii_lowercase(), None),
        };

        match (name.as_str(), value) {
            ("important", None) => options.flags |= RuleFlags::IMPORTANT,
            ("match-case", None) => options.flags |= RuleFlags::MATCH_CASE,
            ("elemhide" | "ehide", None) => options.flags |= RuleFlags::ELEMHIDE,
            ("generichide" | "ghide", None) => options.flags |= RuleFlags::GENERICHIDE,
            ("badfilter", None) => options.badfilter = true,
            ("domain" | "from", Some(value)) => {
                if value.contains('*') {
                    options.unsupported = Some("domain entity".to_string());
                    continue;
                }
                let parsed = parse_domain_option(value)?;
                options.domain_constraints = Some(merge_constraints(options.domain_constraints.take(), parsed));
            }
            ("redirect" | "redirect-rule", Some(value)) => {
                if value.is_empty() {
                    return Err(RuleSyntaxError::MissingValue(name));
                }
                options.redirect = Some(RedirectOption {
                    name: value.to_string(),
                    rule_only: name == "redirect-rule",
                });
            }
            ("csp", value) => {
                options.csp = Some(value.filter(|v| !v.is_empty()).map(str::to_string));
            }
            ("domain" | "from" | "redirect" | "redirect-rule", None) => {
                return Err(RuleSyntaxError::MissingValue(name));
            }
            (_, None) => {
                let (negated, bare) = match name.strip_prefix('~') {
                    Some(rest) => (true, rest),
                    None => (false, name.as_str()),
                };

                if let Some(scope) = ResourceType::from_option_name(bare) {
                    if negated {
                        type_exclude |= scope.bits();
                    } else {
                        type_include |= scope.bits();
                    }
                    continue;
                }

                if let Some(party) = party_mask(bare) {
                    if negated {
                        party_exclude |= party;
                    } else {
                        party_include |= party;
                    }
                    continue;
                }

                if UNSUPPORTED_OPTIONS.contains(&bare) {
                    options.unsupported = Some(bare.to_string());
                    continue;
                }

                return Err(RuleSyntaxError::UnknownOption(raw.to_string()));
            }
            (other, Some(_)) => {
                if UNSUPPORTED_OPTIONS.contains(&other) {
                    options.unsupported = Some(other.to_string());
                    continue;
                }
                return Err(RuleSyntaxError::UnknownOption(raw.to_string()));
            }
        }
    }

    // Negated types never imply `document`
    let implicit = ResourceType::ALL.bits() & !ResourceType::DOCUMENT.bits();
    let type_bits = finalize_mask_u32(type_include, type_exclude, implicit, ResourceType::ALL.bits())
        .ok_or(RuleSyntaxError::EmptyTypeMask)?;
    let party_bits = finalize_mask_u8(party_include, party_exclude, PartyMask::ALL.bits())
        .ok_or(RuleSyntaxError::EmptyTypeMask)?;

    options.scope = ResourceType::from_bits_truncate(type_bits);
    options.party = PartyMask::from_bits_truncate(party_bits);
    Ok(options)
}

fn merge_constraints(existing: Option<DomainConstraint>, incoming: DomainConstraint) -> DomainConstraint {
    match existing {
        Some(mut current) => {
            current.include.extend(incoming.include);
            current.exclude.extend(incoming.exclude);
            current
        }
        None => incoming,
    }
}

fn parse_domain_option(value: &str) -> Result<DomainConstraint, RuleSyntaxError> {
    let mut constraint = DomainConstraint::default();

    for raw in value.split('|') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RuleSyntaxError::EmptyDomain);
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw).ok_or_else(|| RuleSyntaxError::InvalidDomain(raw.to_string()))?;
        if is_exclude {
            constraint.exclude.push(domain);
        } else {
            constraint.include.push(domain);
        }
    }

    Ok(constraint)
}

/// `None` when the options exclude everything. A mask covering everything becomes empty ("any").
fn finalize_mask_u32(include: u32, exclude: u32, implicit: u32, all: u32) -> Option<u32> {
    let include = include & all;
    let exclude = exclude & all;
    if include == 0 && exclude == 0 {
        return Some(0);
    }
    let mask = if include != 0 { include & !exclude } else { implicit & !exclude };
    if mask == 0 {
        return None;
    }
    Some(if mask == all { 0 } else { mask })
}

fn finalize_mask_u8(include: u8, exclude: u8, all: u8) -> Option<u8> {
    let include = include & all;
    let exclude = exclude & all;
    let mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    Some(if mask == all { 0 } else { mask })
}

fn party_mask(name: &str) -> Option<u8> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY.bits()),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY.bits()),
        _ => None,
    }
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

// =============================================================================
// Cosmetic rules
// =============================================================================

const COSMETIC_SEPARATORS: &[&str] = &["#@$?#", "#@?#", "#@$#", "#$?#", "#?#", "#$#", "#@#", "##"];

const PROCEDURAL_MARKERS: &[&str] = &[
    ":-abp-",
    ":has-text(",
    ":contains(",
    ":xpath(",
    ":matches-css",
    ":matches-attr(",
    ":matches-path(",
    ":matches-prop(",
    ":min-text-length(",
    ":upward(",
    ":remove(",
    ":remove-attr(",
    ":remove-class(",
    ":style(",
    ":watch-attr(",
    ":others(",
    ":if(",
    ":if-not(",
];

/// Leftmost cosmetic separator; the longer one wins at the same position.
fn find_cosmetic_separator(line: &str) -> Option<(usize, &'static str)> {
    let mut best: Option<(usize, &'static str)> = None;
    for &separator in COSMETIC_SEPARATORS {
        if let Some(pos) = line.find(separator) {
            let better = match best {
                Some((best_pos, best_sep)) => pos < best_pos || (pos == best_pos && separator.len() > best_sep.len()),
                None => true,
            };
            if better {
                best = Some((pos, separator));
            }
        }
    }
    best
}

fn parse_cosmetic(line: &str, pos: usize, separator: &str) -> Result<ParsedLine, RuleSyntaxError> {
    let domains = line[..pos].trim();
    let raw_selector = &line[pos + separator.len()..];

    // `## comment` in hosts files
    if domains.is_empty() && raw_selector.starts_with(char::is_whitespace) {
        return Ok(ParsedLine::Empty);
    }

    let exception = match separator {
        "##" => false,
        "#@#" => true,
        _ => return Ok(ParsedLine::Unsupported("extended cosmetic filter".to_string())),
    };

    let selector = raw_selector.trim();
    if selector.starts_with("+js(") {
        return Ok(ParsedLine::Unsupported("scriptlet".to_string()));
    }
    if selector.starts_with('^') {
        return Ok(ParsedLine::Unsupported("html filter".to_string()));
    }
    if PROCEDURAL_MARKERS.iter().any(|marker| selector.contains(marker)) {
        return Ok(ParsedLine::Unsupported("procedural cosmetic filter".to_string()));
    }
    if selector.is_empty() || selector.contains(['{', '}', '<']) {
        return Err(RuleSyntaxError::InvalidSelector);
    }
    if domains.contains('*') {
        return Ok(ParsedLine::Unsupported("domain entity".to_string()));
    }

    let mut include = Vec::new();
    let mut exclude = Vec::new();
    if !domains.is_empty() {
        for raw in domains.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(RuleSyntaxError::EmptyDomain);
            }
            let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let domain =
                normalize_domain(domain_raw).ok_or_else(|| RuleSyntaxError::InvalidDomain(raw.to_string()))?;
            if is_exclude {
                exclude.push(domain);
            } else {
                include.push(domain);
            }
        }
    }

    Ok(ParsedLine::Cosmetic(CosmeticRule {
        selector: selector.to_string(),
        include,
        exclude,
        exception,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(line: &str) -> CompiledRule {
        match parse_line(line) {
            Ok(ParsedLine::Network(rule)) => rule,
            other => panic!("expected network rule for {line:?}, got {other:?}"),
        }
    }

    fn malformed(line: &str) -> RuleSyntaxError {
        match parse_line(line) {
            Err(err) => err,
            other => panic!("expected malformed for {line:?}, got {other:?}"),
        }
    }

    fn unsupported(line: &str) -> bool {
        matches!(parse_line(line), Ok(ParsedLine::Unsupported(_)))
    }

    #[test]
    fn comments_and_blank_lines() {
        for line in ["", "   ", "! Title: EasyList", "[Adblock Plus 2.0]", "# hosts comment", "## section"] {
            assert_eq!(parse_line(line), Ok(ParsedLine::Empty), "{line:?}");
        }
    }

    #[test]
    fn hostname_rules() {
        let rule = network("||Ads.Example.com^");
        assert_eq!(rule.host.as_deref(), Some("ads.example.com"));
        assert_eq!(rule.pattern, None);
        assert_eq!(rule.action, RuleAction::Block);

        let rule = network("||ads.example.com^$script,third-party");
        assert_eq!(rule.host.as_deref(), Some("ads.example.com"));
        assert_eq!(rule.scope, ResourceType::SCRIPT);
        assert_eq!(rule.party, PartyMask::THIRD_PARTY);

        // A path keeps it a pattern rule
        let rule = network("||example.com/ads/");
        assert_eq!(rule.host, None);
        assert_eq!(rule.pattern.as_deref(), Some("example.com/ads/"));
        assert_eq!(rule.anchor_type, AnchorType::Hostname);
    }

    #[test]
    fn hosts_file_lines() {
        let rule = network("0.0.0.0 tracker.example.net");
        assert_eq!(rule.host.as_deref(), Some("tracker.example.net"));
        let rule = network("127.0.0.1\tads.example.org # comment");
        assert_eq!(rule.host.as_deref(), Some("ads.example.org"));
        assert_eq!(parse_line("127.0.0.1 localhost"), Ok(ParsedLine::Empty));
        assert_eq!(parse_line("::1 ip6-localhost"), Ok(ParsedLine::Empty));
    }

    #[test]
    fn anchors_and_dollar() {
        let rule = network("|https://ads.");
        assert_eq!(rule.anchor_type, AnchorType::Left);
        assert_eq!(rule.pattern.as_deref(), Some("https://ads."));

        let rule = network("/banner.gif|");
        assert!(rule.right_anchor);

        let rule = network("/banner.gif$");
        assert!(rule.right_anchor);
        assert_eq!(rule.pattern.as_deref(), Some("/banner.gif"));

        let rule = network("/banner.gif$image");
        assert!(!rule.right_anchor);
        assert_eq!(rule.scope, ResourceType::IMAGE);
    }

    #[test]
    fn exceptions_and_flags() {
        let rule = network("@@||cdn.example.com^$important");
        assert_eq!(rule.action, RuleAction::Allow);
        assert!(rule.flags.contains(RuleFlags::IMPORTANT));

        let rule = network("/Ads/banner$match-case");
        assert!(rule.flags.contains(RuleFlags::MATCH_CASE));
        assert_eq!(rule.pattern.as_deref(), Some("/Ads/banner"));
    }

    #[test]
    fn negated_types_exclude_document() {
        let rule = network("@@||example.com^$~script");
        assert!(!rule.scope.contains(ResourceType::SCRIPT));
        assert!(!rule.scope.contains(ResourceType::DOCUMENT));
        assert!(rule.scope.contains(ResourceType::IMAGE));
        assert!(!rule.is_document_level());
    }

    #[test]
    fn domain_option() {
        let rule = network("/ads.js$domain=example.com|~shop.example.com");
        let constraint = rule.domain_constraints.expect("constraint");
        assert_eq!(constraint.include, vec!["example.com".to_string()]);
        assert_eq!(constraint.exclude, vec!["shop.example.com".to_string()]);

        assert_eq!(malformed("/ads.js$domain=a.com||b.com"), RuleSyntaxError::EmptyDomain);
        assert_eq!(malformed("/ads.js$domain="), RuleSyntaxError::EmptyDomain);
    }

    #[test]
    fn redirect_options() {
        let rule = network("||ads.example.com/ad.js$script,redirect=noopjs");
        assert_eq!(rule.action, RuleAction::Block);
        assert_eq!(rule.redirect.as_deref(), Some("data:text/javascript,"));
        assert!(rule.flags.contains(RuleFlags::FROM_REDIRECT_EQ));

        let rule = network("||ads.example.com^$redirect-rule=nooptext");
        assert_eq!(rule.action, RuleAction::RedirectDirective);

        // Unknown resource degrades to a plain block
        let rule = network("||ads.example.com^$redirect=unknown-thing.js");
        assert_eq!(rule.action, RuleAction::Block);
        assert_eq!(rule.redirect, None);

        assert!(unsupported("||ads.example.com^$redirect-rule=unknown-thing.js"));
        assert!(unsupported("@@||ads.example.com^$redirect=noopjs"));
    }

    #[test]
    fn csp_options() {
        let rule = network("||example.com^$csp=script-src 'self'");
        assert_eq!(rule.action, RuleAction::CspInject);
        assert_eq!(rule.csp.as_deref(), Some("script-src 'self'"));
        assert!(rule.is_document_level());

        let rule = network("@@||example.com^$csp");
        assert_eq!(rule.action, RuleAction::CspInject);
        assert!(rule.flags.contains(RuleFlags::CSP_EXCEPTION));
        assert_eq!(rule.csp, None);

        let rule = network("$csp=worker-src 'none',domain=example.com");
        assert_eq!(rule.pattern, None);

        assert_eq!(malformed("||example.com^$csp"), RuleSyntaxError::MissingValue("csp".to_string()));
    }

    #[test]
    fn document_level_exceptions() {
        let rule = network("@@||example.com^$document");
        assert!(rule.is_document_level());
        let rule = network("@@||example.com^$generichide");
        assert!(rule.flags.contains(RuleFlags::GENERICHIDE));
        assert_eq!(
            malformed("||example.com^$elemhide"),
            RuleSyntaxError::InvalidOption("elemhide".to_string())
        );
        assert!(unsupported("||example.com^$document"));
    }

    #[test]
    fn malformed_rules() {
        assert!(matches!(malformed("/ads/x$bogus"), RuleSyntaxError::UnknownOption(_)));
        assert_eq!(malformed("$script"), RuleSyntaxError::EmptyPattern);
        assert_eq!(malformed("*^*"), RuleSyntaxError::NoLiteral);
        assert_eq!(malformed("ad|s.js"), RuleSyntaxError::MisplacedPipe);
        assert_eq!(malformed("ads .js$script"), RuleSyntaxError::Whitespace);
        assert_eq!(malformed("/ads.js$~script,script"), RuleSyntaxError::EmptyTypeMask);
    }

    #[test]
    fn unsupported_rules() {
        assert!(unsupported("/ads?[0-9]+/"));
        assert!(unsupported("/banner\\d+/$image"));
        assert!(unsupported("||example.com^$popup"));
        assert!(unsupported("example.com##+js(set-constant, x, 1)"));
        assert!(unsupported("example.com#?#div:has-text(Sponsored)"));
        assert!(unsupported("example.com#$#abort-on-property-read x"));
        assert!(unsupported("##.ad:-abp-has(.x)"));
    }

    #[test]
    fn cosmetic_rules() {
        let rule = match parse_line("##.ad-banner") {
            Ok(ParsedLine::Cosmetic(rule)) => rule,
            other => panic!("{other:?}"),
        };
        assert!(rule.is_generic());
        assert_eq!(rule.selector, ".ad-banner");

        let rule = match parse_line("example.com,~shop.example.com###promo") {
            Ok(ParsedLine::Cosmetic(rule)) => rule,
            other => panic!("{other:?}"),
        };
        assert_eq!(rule.selector, "#promo");
        assert_eq!(rule.include, vec!["example.com".to_string()]);
        assert_eq!(rule.exclude, vec!["shop.example.com".to_string()]);

        let rule = match parse_line("example.com#@#.sidebar") {
            Ok(ParsedLine::Cosmetic(rule)) => rule,
            other => panic!("{other:?}"),
        };
        assert!(rule.exception);

        assert_eq!(malformed("##div{color:red}"), RuleSyntaxError::InvalidSelector);
        assert_eq!(malformed("a.com,,b.com##.ad"), RuleSyntaxError::EmptyDomain);
    }

    #[test]
    fn list_parse_collects_malformed() {
        let text = "! comment\n||ads.example.com^\n/ads.js$bogus\n##.ad\n/re+gex/\n";
        let parsed = parse_filter_list(text, 3);
        assert_eq!(parsed.lines, 5);
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.rules[0].list_id, 3);
        assert_eq!(parsed.cosmetics.len(), 1);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.malformed.len(), 1);
        assert_eq!(parsed.malformed[0].line, 3);
        assert_eq!(parsed.malformed[0].text, "/ads.js$bogus");
    }
}
