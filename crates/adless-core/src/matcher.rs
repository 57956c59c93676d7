//! Filter Matcher
//!
//! Every reference in a document goes through [`Matcher::match_reference`].
//! The result does not depend on the order rules appeared in their lists:
//! matching rules are collected first and precedence is applied afterwards.

use std::collections::HashSet;

use crate::psl::is_third_party;
use crate::ruleset::{Rule, RuleSet};
use crate::signatures;
use crate::types::{MatchContext, MatchDecision, MatchResult, MatchSource, ResourceType, RuleAction, RuleFlags};
use crate::url::{extract_host, tokenize_url};

/// Selectors per emitted CSS block. An invalid selector only voids its own group.
const SELECTORS_PER_GROUP: usize = 64;

// =============================================================================
// Matcher
// =============================================================================

/// Matches references against a [`RuleSet`]. Cheap to create per document.
pub struct Matcher<'a> {
    rules: &'a RuleSet,
    signatures: bool,
}

/// Element hiding exceptions active on a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HidingExceptions {
    /// `$elemhide`: no cosmetic filtering at all
    pub elemhide: bool,
    /// `$generichide`: only site-specific cosmetics
    pub generichide: bool,
}

/// Lowercased view of a document URL.
struct DocumentUrl<'u> {
    url: &'u str,
    lower: String,
}

impl<'u> DocumentUrl<'u> {
    fn new(url: &'u str) -> Self {
        Self {
            url,
            lower: url.to_ascii_lowercase(),
        }
    }

    fn host(&self) -> &str {
        extract_host(&self.lower).unwrap_or("")
    }
}

impl<'a> Matcher<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self {
            rules,
            signatures: true,
        }
    }

    /// Enable or disable the built-in signature fallback.
    pub fn with_signatures(mut self, enabled: bool) -> Self {
        self.signatures = enabled;
        self
    }

    pub fn rule_set(&self) -> &'a RuleSet {
        self.rules
    }

    /// Decide what happens to one resolved reference.
    pub fn match_reference(&self, ctx: &MatchContext<'_>) -> MatchResult {
        let url_lower = ctx.url.to_ascii_lowercase();
        let host = extract_host(&url_lower).unwrap_or("");
        let document_host = ctx.document_host.to_ascii_lowercase();
        let third_party = is_third_party(&document_host, host);
        let tokens = tokenize_url(&url_lower);

        let (indexed, unindexed) = self.rules.candidates(&url_lower, host, &tokens);
        let mut hits = Vec::new();
        for rule_id in indexed.into_iter().chain(unindexed.iter().copied()) {
            let Some(rule) = self.rules.rule(rule_id) else {
                continue;
            };
            if !rule.applies_to(ctx.scope, third_party, &document_host) {
                continue;
            }
            if rule.matcher.matches(ctx.url, &url_lower, host) {
                hits.push(rule_id);
            }
        }

        let result = if hits.is_empty() {
            MatchResult::default()
        } else {
            hits.sort_unstable();
            self.apply_precedence(&hits)
        };

        // Only an exception stops the signature fallback; directive-only hits do not.
        if result.decision == MatchDecision::Allow && result.source == MatchSource::Default {
            return self.match_signatures(host);
        }
        result
    }

    /// Whether a `@@…$document` exception turns filtering off for the page.
    pub fn is_document_exempt(&self, document_url: &str) -> bool {
        let doc = DocumentUrl::new(document_url);
        let exempt = self.document_hits(&doc).any(|rule| {
            rule.action == RuleAction::Allow
                && rule.scope.contains(ResourceType::DOCUMENT)
                && !rule.flags.intersects(RuleFlags::ELEMHIDE | RuleFlags::GENERICHIDE)
        });
        exempt
    }

    /// CSP directives to add to the document response, by rule order.
    pub fn csp_directives(&self, document_url: &str) -> Vec<String> {
        let doc = DocumentUrl::new(document_url);
        let mut injected: Vec<&str> = Vec::new();
        let mut exceptions: HashSet<&str> = HashSet::new();

        for rule in self.document_hits(&doc) {
            if rule.action != RuleAction::CspInject {
                continue;
            }
            if rule.flags.contains(RuleFlags::CSP_EXCEPTION) {
                match rule.csp.as_deref() {
                    Some(directive) => {
                        exceptions.insert(directive);
                    }
                    // `@@…$csp` without a value disables every injection
                    None => return Vec::new(),
                }
            } else if let Some(directive) = rule.csp.as_deref() {
                if !injected.contains(&directive) {
                    injected.push(directive);
                }
            }
        }

        injected
            .into_iter()
            .filter(|directive| !exceptions.contains(directive))
            .map(str::to_string)
            .collect()
    }

    pub fn hiding_exceptions(&self, document_url: &str) -> HidingExceptions {
        let doc = DocumentUrl::new(document_url);
        let mut result = HidingExceptions::default();
        for rule in self.document_hits(&doc) {
            if rule.action != RuleAction::Allow {
                continue;
            }
            result.elemhide |= rule.flags.contains(RuleFlags::ELEMHIDE);
            result.generichide |= rule.flags.contains(RuleFlags::GENERICHIDE);
        }
        result
    }

    /// Stylesheet hiding every cosmetic selector that applies to the document.
    /// Empty when nothing applies.
    pub fn cosmetic_css(&self, document_url: &str) -> String {
        let hiding = self.hiding_exceptions(document_url);
        if hiding.elemhide {
            return String::new();
        }

        let doc = DocumentUrl::new(document_url);
        let host = doc.host();
        let exceptions = self.cosmetic_exceptions(host);
        let (specific, generic) = self.rules.cosmetic_candidates(host);
        let generic: &[usize] = if hiding.generichide { &[] } else { generic };

        let cosmetics = self.rules.cosmetics();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut selectors: Vec<&str> = Vec::new();
        for &id in specific.iter().chain(generic.iter()) {
            let Some(rule) = cosmetics.get(id) else {
                continue;
            };
            if rule.exception || !rule.applies_to(host) || exceptions.contains(rule.selector.as_str()) {
                continue;
            }
            if seen.insert(rule.selector.as_str()) {
                selectors.push(rule.selector.as_str());
            }
        }

        let mut css = String::new();
        for group in selectors.chunks(SELECTORS_PER_GROUP) {
            css.push_str(&group.join(",\n"));
            css.push_str("{display:none !important;}\n");
        }
        css
    }

    /// Class/id signature check for elements of one document.
    pub fn element_hiding(&self, document_url: &str) -> ElementHiding<'a> {
        let hiding = self.hiding_exceptions(document_url);
        let doc = DocumentUrl::new(document_url);
        ElementHiding {
            enabled: self.signatures && !hiding.elemhide && !hiding.generichide,
            exceptions: self.cosmetic_exceptions(doc.host()),
        }
    }

    // -------------------------------------------------------------------------

    fn document_hits<'d>(&'d self, doc: &'d DocumentUrl<'_>) -> impl Iterator<Item = &'a Rule> + 'd {
        let rules: &'a RuleSet = self.rules;
        let host = doc.host();
        rules
            .document_rules()
            .iter()
            .filter_map(move |&id| rules.rule(id))
            .filter(move |rule| {
                rule.applies_to(ResourceType::DOCUMENT, false, host)
                    && rule.matcher.matches(doc.url, &doc.lower, host)
            })
    }

    fn cosmetic_exceptions(&self, host: &str) -> HashSet<&'a str> {
        let rules: &'a RuleSet = self.rules;
        let (specific, generic) = rules.cosmetic_candidates(host);
        specific
            .iter()
            .chain(generic.iter())
            .filter_map(|&id| rules.cosmetics().get(id))
            .filter(|rule| rule.exception && rule.applies_to(host))
            .map(|rule| rule.selector.as_str())
            .collect()
    }

    fn match_signatures(&self, host: &str) -> MatchResult {
        if self.signatures {
            if let Some(signature) = signatures::match_host(host) {
                log::debug!("built-in signature {} matched host {}", signature, host);
                return MatchResult {
                    decision: MatchDecision::Block,
                    rule_id: None,
                    source: MatchSource::Signature,
                };
            }
        }
        MatchResult::default()
    }

    /// `hits` must be ascending rule ids.
    fn apply_precedence(&self, hits: &[usize]) -> MatchResult {
        let mut important_allow: Option<usize> = None;
        let mut important_block: Vec<usize> = Vec::new();
        let mut allow: Option<usize> = None;
        let mut block: Vec<usize> = Vec::new();
        let mut directives: Vec<usize> = Vec::new();

        for &id in hits {
            let Some(rule) = self.rules.rule(id) else {
                continue;
            };
            match (rule.action, rule.is_important()) {
                (RuleAction::Allow, true) => {
                    important_allow.get_or_insert(id);
                }
                (RuleAction::Allow, false) => {
                    allow.get_or_insert(id);
                }
                (RuleAction::Block, true) => important_block.push(id),
                (RuleAction::Block, false) => block.push(id),
                (RuleAction::RedirectDirective, _) => directives.push(id),
                (RuleAction::CspInject, _) => {}
            }
        }

        if let Some(id) = important_allow {
            return exception(id);
        }
        if !important_block.is_empty() {
            return self.block_or_redirect(&important_block, &directives);
        }
        if let Some(id) = allow {
            return exception(id);
        }
        if !block.is_empty() {
            return self.block_or_redirect(&block, &directives);
        }

        MatchResult::default()
    }

    /// The lowest-index redirect-capable rule decides the redirect target.
    fn block_or_redirect(&self, blocks: &[usize], directives: &[usize]) -> MatchResult {
        let redirect = blocks
            .iter()
            .chain(directives.iter())
            .filter_map(|&id| {
                self.rules
                    .rule(id)
                    .and_then(|rule| rule.redirect.as_deref())
                    .map(|target| (id, target))
            })
            .min_by_key(|(id, _)| *id);

        match redirect {
            Some((id, target)) => MatchResult {
                decision: MatchDecision::Redirect(target.to_string()),
                rule_id: Some(id),
                source: MatchSource::Rule,
            },
            None => MatchResult {
                decision: MatchDecision::Block,
                rule_id: blocks.first().copied(),
                source: MatchSource::Rule,
            },
        }
    }
}

fn exception(rule_id: usize) -> MatchResult {
    MatchResult {
        decision: MatchDecision::Allow,
        rule_id: Some(rule_id),
        source: MatchSource::Exception,
    }
}

// =============================================================================
// Element Hiding
// =============================================================================

/// Per-document class/id signature check.
#[derive(Debug, Clone)]
pub struct ElementHiding<'a> {
    enabled: bool,
    exceptions: HashSet<&'a str>,
}

impl<'a> ElementHiding<'a> {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the signature token that hides an element with these attributes.
    ///
    /// A `#@#.name` or `#@#` + `#name` exception for the exact class or id
    /// keeps the element.
    pub fn check(&self, tag: &str, class: Option<&str>, id: Option<&str>) -> Option<&'static str> {
        if !self.enabled || signatures::is_structural_element(tag) {
            return None;
        }

        if let Some(class) = class {
            for name in class.split_ascii_whitespace() {
                if let Some(token) = signatures::match_name(name) {
                    if !self.exceptions.contains(format!(".{}", name).as_str()) {
                        return Some(token);
                    }
                }
            }
        }

        let id = id.map(str::trim).filter(|id| !id.is_empty())?;
        let token = signatures::match_name(id)?;
        if self.exceptions.contains(format!("#{}", id).as_str()) {
            return None;
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{AnchorType, Pattern, PatternOp};
    use crate::ruleset::{CosmeticRule, DomainConstraint, RuleIndex, RuleMatcher};
    use crate::types::PartyMask;

    fn rule(raw: &str, action: RuleAction, matcher: RuleMatcher) -> Rule {
        Rule {
            raw: raw.to_string(),
            action,
            flags: RuleFlags::empty(),
            matcher,
            list_id: 0,
            scope: ResourceType::empty(),
            party: PartyMask::empty(),
            domains: None,
            redirect: None,
            csp: None,
        }
    }

    fn host(host: &str) -> RuleMatcher {
        RuleMatcher::Host(host.to_string())
    }

    fn literal(text: &str) -> RuleMatcher {
        RuleMatcher::Pattern(Pattern::new(
            vec![PatternOp::Literal(text.to_string())],
            AnchorType::None,
            false,
            false,
        ))
    }

    /// Builds a set with every network rule unindexed and document rules flagged.
    fn build(rules: Vec<Rule>, cosmetics: Vec<CosmeticRule>) -> RuleSet {
        let mut index = RuleIndex::default();
        for (id, rule) in rules.iter().enumerate() {
            let document_level = rule.action == RuleAction::CspInject
                || rule.flags.intersects(RuleFlags::ELEMHIDE | RuleFlags::GENERICHIDE)
                || rule.scope == ResourceType::DOCUMENT;
            if document_level {
                index.insert_document(id);
            } else {
                index.insert_unindexed(id);
            }
        }
        RuleSet::new(rules, index, cosmetics)
    }

    fn ctx<'a>(url: &'a str, scope: ResourceType) -> MatchContext<'a> {
        MatchContext {
            url,
            scope,
            document_host: "example.com",
        }
    }

    #[test]
    fn empty_set_allows() {
        let set = RuleSet::empty();
        let matcher = Matcher::new(&set);
        let result = matcher.match_reference(&ctx("https://cdn.example.com/app.js", ResourceType::SCRIPT));
        assert_eq!(result, MatchResult::default());
    }

    #[test]
    fn block_and_exception() {
        let allow = rule("@@||ads.net/ok/", RuleAction::Allow, literal("ads.net/ok/"));
        let set = build(vec![rule("||ads.net^", RuleAction::Block, host("ads.net")), allow], Vec::new());
        let matcher = Matcher::new(&set);

        let blocked = matcher.match_reference(&ctx("https://ads.net/banner.png", ResourceType::IMAGE));
        assert_eq!(blocked.decision, MatchDecision::Block);
        assert_eq!(blocked.rule_id, Some(0));

        let allowed = matcher.match_reference(&ctx("https://ads.net/ok/x.png", ResourceType::IMAGE));
        assert_eq!(allowed.decision, MatchDecision::Allow);
        assert_eq!(allowed.source, MatchSource::Exception);
    }

    #[test]
    fn important_beats_exception() {
        let mut block = rule("||ads.net^$important", RuleAction::Block, host("ads.net"));
        block.flags = RuleFlags::IMPORTANT;
        let allow = rule("@@||ads.net^", RuleAction::Allow, host("ads.net"));
        let set = build(vec![allow, block], Vec::new());

        let result = Matcher::new(&set).match_reference(&ctx("https://ads.net/a.js", ResourceType::SCRIPT));
        assert_eq!(result.decision, MatchDecision::Block);
        assert_eq!(result.rule_id, Some(1));
    }

    #[test]
    fn redirect_lowest_index_wins() {
        let mut first = rule("||ads.net^$redirect=noopjs", RuleAction::Block, host("ads.net"));
        first.redirect = Some("data:text/javascript,".to_string());
        let mut directive = rule("||ads.net^$redirect-rule=nooptext", RuleAction::RedirectDirective, host("ads.net"));
        directive.redirect = Some("data:text/plain,".to_string());
        let plain = rule("||ads.net^", RuleAction::Block, host("ads.net"));

        let set = build(vec![plain.clone(), directive.clone(), first.clone()], Vec::new());
        let result = Matcher::new(&set).match_reference(&ctx("https://ads.net/a.js", ResourceType::SCRIPT));
        assert_eq!(result.decision, MatchDecision::Redirect("data:text/plain,".to_string()));
        assert_eq!(result.rule_id, Some(1));

        let set = build(vec![first, plain, directive], Vec::new());
        let result = Matcher::new(&set).match_reference(&ctx("https://ads.net/a.js", ResourceType::SCRIPT));
        assert_eq!(result.decision, MatchDecision::Redirect("data:text/javascript,".to_string()));
    }

    #[test]
    fn redirect_directive_alone_does_not_block() {
        let mut directive = rule("||ads.net^$redirect-rule=noopjs", RuleAction::RedirectDirective, host("ads.net"));
        directive.redirect = Some("data:text/javascript,".to_string());
        let set = build(vec![directive], Vec::new());

        let result = Matcher::new(&set)
            .with_signatures(false)
            .match_reference(&ctx("https://ads.net/a.js", ResourceType::SCRIPT));
        assert_eq!(result.decision, MatchDecision::Allow);
    }

    #[test]
    fn scope_party_and_domain_options() {
        let mut scoped = rule("/track.$script,third-party,domain=example.com", RuleAction::Block, literal("/track."));
        scoped.scope = ResourceType::SCRIPT;
        scoped.party = PartyMask::THIRD_PARTY;
        scoped.domains = Some(DomainConstraint {
            include: vec!["example.com".to_string()],
            exclude: Vec::new(),
        });
        let set = build(vec![scoped], Vec::new());
        let matcher = Matcher::new(&set);

        let hit = matcher.match_reference(&ctx("https://cdn.other.net/track.js", ResourceType::SCRIPT));
        assert!(hit.is_blocked());

        let image = matcher.match_reference(&ctx("https://cdn.other.net/track.js", ResourceType::IMAGE));
        assert!(!image.is_blocked());

        let first_party = matcher.match_reference(&ctx("https://static.example.com/track.js", ResourceType::SCRIPT));
        assert!(!first_party.is_blocked());

        let elsewhere = matcher.match_reference(&MatchContext {
            url: "https://cdn.other.net/track.js",
            scope: ResourceType::SCRIPT,
            document_host: "news.org",
        });
        assert!(!elsewhere.is_blocked());
    }

    #[test]
    fn signature_fallback_yields_to_exceptions() {
        let set = RuleSet::empty();
        let tracker = "https://stats.g.doubleclick.net/collect";

        let result = Matcher::new(&set).match_reference(&ctx(tracker, ResourceType::SCRIPT));
        assert_eq!(result.decision, MatchDecision::Block);
        assert_eq!(result.source, MatchSource::Signature);

        let disabled = Matcher::new(&set)
            .with_signatures(false)
            .match_reference(&ctx(tracker, ResourceType::SCRIPT));
        assert_eq!(disabled.decision, MatchDecision::Allow);

        let allow = rule("@@||doubleclick.net^", RuleAction::Allow, host("doubleclick.net"));
        let set = build(vec![allow], Vec::new());
        let result = Matcher::new(&set).match_reference(&ctx(tracker, ResourceType::SCRIPT));
        assert_eq!(result.decision, MatchDecision::Allow);
        assert_eq!(result.source, MatchSource::Exception);
    }

    #[test]
    fn signature_fallback_survives_directive_only_hits() {
        let mut directive = rule(
            "||doubleclick.net^$redirect-rule=noopjs",
            RuleAction::RedirectDirective,
            host("doubleclick.net"),
        );
        directive.redirect = Some("data:text/javascript,".to_string());
        let set = build(vec![directive], Vec::new());

        let result = Matcher::new(&set).match_reference(&ctx("https://ad.doubleclick.net/tag.js", ResourceType::SCRIPT));
        assert_eq!(result.decision, MatchDecision::Block);
        assert_eq!(result.source, MatchSource::Signature);
    }

    #[test]
    fn csp_directives() {
        let csp = |raw: &str, value: Option<&str>, exception: bool| {
            let mut r = rule(raw, RuleAction::CspInject, host("example.com"));
            r.csp = value.map(str::to_string);
            if exception {
                r.flags = RuleFlags::CSP_EXCEPTION;
            }
            r
        };
        let set = build(
            vec![
                csp("||example.com^$csp=script-src 'self'", Some("script-src 'self'"), false),
                csp("||example.com^$csp=worker-src 'none'", Some("worker-src 'none'"), false),
                csp("||example.com^$csp=script-src 'self'", Some("script-src 'self'"), false),
                csp("@@||example.com^$csp=worker-src 'none'", Some("worker-src 'none'"), true),
            ],
            Vec::new(),
        );
        let matcher = Matcher::new(&set);
        assert_eq!(matcher.csp_directives("https://example.com/"), vec!["script-src 'self'".to_string()]);
        assert!(matcher.csp_directives("https://other.com/").is_empty());

        let set = build(
            vec![
                csp("||example.com^$csp=script-src 'self'", Some("script-src 'self'"), false),
                csp("@@||example.com^$csp", None, true),
            ],
            Vec::new(),
        );
        assert!(Matcher::new(&set).csp_directives("https://example.com/").is_empty());
    }

    #[test]
    fn document_exemption() {
        let mut exempt = rule("@@||example.com^$document", RuleAction::Allow, host("example.com"));
        exempt.scope = ResourceType::DOCUMENT;
        let set = build(vec![exempt], Vec::new());
        let matcher = Matcher::new(&set);
        assert!(matcher.is_document_exempt("https://www.example.com/page"));
        assert!(!matcher.is_document_exempt("https://other.com/"));
    }

    fn cosmetic(selector: &str, include: &[&str], exception: bool) -> CosmeticRule {
        CosmeticRule {
            selector: selector.to_string(),
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: Vec::new(),
            exception,
        }
    }

    #[test]
    fn cosmetic_css() {
        let set = build(
            Vec::new(),
            vec![
                cosmetic(".banner", &[], false),
                cosmetic("#promo", &["example.com"], false),
                cosmetic(".sidebar-ad", &[], false),
                cosmetic(".sidebar-ad", &["example.com"], true),
            ],
        );
        let matcher = Matcher::new(&set);

        let css = matcher.cosmetic_css("https://www.example.com/");
        assert_eq!(css, "#promo,\n.banner{display:none !important;}\n");

        let css = matcher.cosmetic_css("https://other.com/");
        assert_eq!(css, ".banner,\n.sidebar-ad{display:none !important;}\n");
    }

    #[test]
    fn generichide_and_elemhide() {
        let mut generic = rule("@@||example.com^$generichide", RuleAction::Allow, host("example.com"));
        generic.flags = RuleFlags::GENERICHIDE;
        let mut elem = rule("@@||quiet.org^$elemhide", RuleAction::Allow, host("quiet.org"));
        elem.flags = RuleFlags::ELEMHIDE;
        let set = build(
            vec![generic, elem],
            vec![cosmetic(".banner", &[], false), cosmetic("#promo", &["example.com", "quiet.org"], false)],
        );
        let matcher = Matcher::new(&set);

        assert_eq!(matcher.cosmetic_css("https://example.com/"), "#promo{display:none !important;}\n");
        assert_eq!(matcher.cosmetic_css("https://quiet.org/"), "");
        assert!(!matcher.element_hiding("https://example.com/").is_enabled());
        assert!(matcher.element_hiding("https://news.org/").is_enabled());
        // elemhide/generichide never affect network matching
        assert!(!matcher.is_document_exempt("https://example.com/"));
    }

    #[test]
    fn element_hiding_signatures() {
        let set = build(Vec::new(), vec![cosmetic(".ad-keep", &[], true)]);
        let hiding = Matcher::new(&set).element_hiding("https://example.com/");

        assert_eq!(hiding.check("div", Some("content ad-slot"), None), Some("ad"));
        assert_eq!(hiding.check("div", None, Some("sponsored")), Some("sponsored"));
        assert_eq!(hiding.check("div", Some("header"), Some("main")), None);
        assert_eq!(hiding.check("div", Some("ad-keep"), None), None);
        assert_eq!(hiding.check("body", Some("ads"), None), None);

        let off = Matcher::new(&set).with_signatures(false).element_hiding("https://example.com/");
        assert_eq!(off.check("div", Some("ad"), None), None);
    }
}
