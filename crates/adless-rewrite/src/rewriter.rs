//! Document Rewriter
//!
//! Two streaming passes over the markup with `lol_html`:
//!
//! 1. A prescan that records what the document already contains (`<base href>`,
//!    `<head>`, `<html>`, a previously injected cosmetic stylesheet).
//! 2. The rewrite itself: every URL-bearing attribute listed in
//!    [`crate::elements`] is resolved and matched, `<style>` text and `style=""`
//!    attributes get their `url(...)` references resolved, and the `<base>` /
//!    cosmetic stylesheet are injected where the prescan says they belong.
//!
//! An element whose reference is blocked is removed together with its content.

use std::borrow::Cow;
use std::error::Error;

use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, text, HtmlRewriter, Settings};
use serde::Serialize;

use adless_core::resolve::{join_srcset, resolve_srcset};
use adless_core::{
    resolve, rewrite_css_urls, ElementHiding, MatchContext, MatchDecision, MatchSource, Matcher, Origin,
    ResourceType, RuleSet,
};

use crate::elements::{self, AttributeKind, ElementSpec, Scope};
use crate::options::RewriteOptions;

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

// =============================================================================
// Output Types
// =============================================================================

/// CSP directives for the document response, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CspDirectiveSet {
    directives: Vec<String>,
}

impl CspDirectiveSet {
    pub fn new(directives: Vec<String>) -> Self {
        Self { directives }
    }

    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Value for a `Content-Security-Policy` header, `None` when there is nothing to add.
    pub fn header_value(&self) -> Option<String> {
        if self.directives.is_empty() {
            None
        } else {
            Some(self.directives.join("; "))
        }
    }
}

/// Counters collected during one rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteStats {
    /// Attribute values and `url(...)` references made absolute
    pub resolved: usize,
    /// Elements removed by a block decision
    pub blocked: usize,
    /// References replaced by a redirect target
    pub redirected: usize,
    /// Elements removed by a class/id signature
    pub hidden_by_signature: usize,
    pub base_injected: bool,
    pub cosmetic_injected: bool,
}

/// Rewritten markup plus the CSP directives computed for the document URL.
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub body: Vec<u8>,
    pub csp: CspDirectiveSet,
    pub stats: RewriteStats,
}

// =============================================================================
// Rewriter
// =============================================================================

pub struct Rewriter<'a> {
    origin: &'a Origin,
    matcher: Matcher<'a>,
    options: RewriteOptions,
}

impl<'a> Rewriter<'a> {
    pub fn new(origin: &'a Origin, rule_set: &'a RuleSet, options: RewriteOptions) -> Self {
        Self {
            origin,
            matcher: Matcher::new(rule_set).with_signatures(options.builtin_signatures),
            options,
        }
    }

    /// Rewrite one document. Output is all-or-nothing.
    pub fn rewrite(&self, html: &[u8]) -> Result<Rewritten, RewritingError> {
        let document_url = self.origin.document_url();
        let filtering = !self.matcher.is_document_exempt(document_url);
        if !filtering {
            log::debug!("{} is exempt from filtering", document_url);
        }

        let found = prescan(html)?;
        let csp = if filtering {
            CspDirectiveSet::new(self.matcher.csp_directives(document_url))
        } else {
            CspDirectiveSet::default()
        };

        let mut pass = ElementPass {
            rewriter: self,
            hiding: self.matcher.element_hiding(document_url),
            filtering,
            injection: self.injection(&found, filtering),
            stats: RewriteStats::default(),
            excepted: false,
        };
        let mut style_buffer = String::new();
        let mut styles_resolved = 0usize;
        let origin = self.origin;

        let mut body = Vec::with_capacity(html.len() + 256);
        {
            let mut rewriter = HtmlRewriter::new(
                Settings {
                    element_content_handlers: vec![
                        element!("*", |el| pass.on_element(el)),
                        text!("style", |chunk| {
                            style_buffer.push_str(chunk.as_str());
                            if !chunk.last_in_text_node() {
                                chunk.remove();
                                return Ok(());
                            }
                            let css = std::mem::take(&mut style_buffer);
                            let rewritten = rewrite_css_urls(&css, origin);
                            if matches!(rewritten, Cow::Owned(_)) {
                                styles_resolved += 1;
                            }
                            chunk.replace(&rewritten, ContentType::Html);
                            Ok(())
                        }),
                    ],
                    strict: false,
                    adjust_charset_on_meta_tag: true,
                    ..Settings::new()
                },
                |c: &[u8]| body.extend_from_slice(c),
            );
            rewriter.write(html)?;
            rewriter.end()?;
        }

        let mut stats = pass.stats;
        stats.resolved += styles_resolved;

        Ok(Rewritten { body, csp, stats })
    }

    fn injection(&self, found: &Prescan, filtering: bool) -> Option<Injection> {
        let mut markup = String::new();
        let mut base = false;
        let mut cosmetic = false;

        if self.options.inject_base && !found.has_base_href {
            markup.push_str("<base href=\"");
            markup.push_str(&escape_attribute(self.origin.document_url()));
            markup.push_str("\">");
            base = true;
        }

        if filtering && self.options.cosmetic_filters && !found.has_cosmetic_style {
            let css = self.matcher.cosmetic_css(self.origin.document_url());
            if css.to_ascii_lowercase().contains("</style") {
                log::warn!("cosmetic stylesheet contains a closing style tag, not injected");
            } else if !css.is_empty() {
                markup.push_str("<style data-adless-cosmetic>\n");
                markup.push_str(&css);
                markup.push_str("</style>");
                cosmetic = true;
            }
        }

        if markup.is_empty() {
            return None;
        }

        let at = if found.has_head {
            InjectAt::Head
        } else if found.has_html {
            InjectAt::Html
        } else {
            InjectAt::FirstElement
        };

        Some(Injection {
            markup,
            at,
            base,
            cosmetic,
        })
    }
}

// =============================================================================
// Prescan
// =============================================================================

#[derive(Debug, Default)]
struct Prescan {
    has_base_href: bool,
    has_head: bool,
    has_html: bool,
    has_cosmetic_style: bool,
}

fn prescan(html: &[u8]) -> Result<Prescan, RewritingError> {
    let mut found = Prescan::default();
    {
        let Prescan {
            has_base_href,
            has_head,
            has_html,
            has_cosmetic_style,
        } = &mut found;

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("base[href]", |_el| {
                        *has_base_href = true;
                        Ok(())
                    }),
                    element!("head", |_el| {
                        *has_head = true;
                        Ok(())
                    }),
                    element!("html", |_el| {
                        *has_html = true;
                        Ok(())
                    }),
                    element!("style[data-adless-cosmetic]", |_el| {
                        *has_cosmetic_style = true;
                        Ok(())
                    }),
                ],
                strict: false,
                ..Settings::new()
            },
            |_: &[u8]| {},
        );
        rewriter.write(html)?;
        rewriter.end()?;
    }
    Ok(found)
}

// =============================================================================
// Element Pass
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InjectAt {
    Head,
    Html,
    FirstElement,
}

#[derive(Debug)]
struct Injection {
    markup: String,
    at: InjectAt,
    base: bool,
    cosmetic: bool,
}

/// What to do with one attribute value.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Keep,
    Resolved(String),
    Redirected(String),
    Remove,
}

struct ElementPass<'r, 'a> {
    rewriter: &'r Rewriter<'a>,
    hiding: ElementHiding<'a>,
    filtering: bool,
    injection: Option<Injection>,
    stats: RewriteStats,
    /// An exception rule allowed one of the current element's references
    excepted: bool,
}

impl ElementPass<'_, '_> {
    fn on_element(&mut self, el: &mut Element<'_, '_>) -> HandlerResult {
        let tag = el.tag_name().to_ascii_lowercase();
        self.excepted = false;

        self.inject(el, &tag);

        if let Some(spec) = elements::lookup(&tag) {
            self.rewrite_urls(el, &tag, spec)?;
            if el.removed() {
                return Ok(());
            }
        }

        if let Some(style) = el.get_attribute("style") {
            if let Cow::Owned(rewritten) = rewrite_css_urls(&style, self.rewriter.origin) {
                el.set_attribute("style", &rewritten)?;
                self.stats.resolved += 1;
            }
        }

        if self.filtering && self.hiding.is_enabled() && !self.excepted {
            let class = el.get_attribute("class");
            let id = el.get_attribute("id");
            if let Some(token) = self.hiding.check(&tag, class.as_deref(), id.as_deref()) {
                log::debug!("removed <{}> by name signature '{}'", tag, token);
                el.remove();
                self.stats.hidden_by_signature += 1;
            }
        }

        Ok(())
    }

    fn inject(&mut self, el: &mut Element<'_, '_>, tag: &str) {
        let ready = match &self.injection {
            Some(injection) => match injection.at {
                InjectAt::Head => tag == "head",
                InjectAt::Html => tag == "html",
                InjectAt::FirstElement => true,
            },
            None => false,
        };
        if !ready {
            return;
        }
        let Some(injection) = self.injection.take() else {
            return;
        };

        match injection.at {
            InjectAt::Head | InjectAt::Html => el.prepend(&injection.markup, ContentType::Html),
            InjectAt::FirstElement => el.before(&injection.markup, ContentType::Html),
        }
        self.stats.base_injected = injection.base;
        self.stats.cosmetic_injected = injection.cosmetic;
    }

    fn rewrite_urls(&mut self, el: &mut Element<'_, '_>, tag: &str, spec: &ElementSpec) -> HandlerResult {
        for attribute in spec.attributes {
            let Some(value) = el.get_attribute(attribute.name) else {
                continue;
            };

            let scope = match attribute.scope {
                _ if !self.filtering => None,
                Scope::Fixed(scope) => Some(scope),
                Scope::LinkRel => Some(elements::link_scope(
                    el.get_attribute("rel").as_deref(),
                    el.get_attribute("as").as_deref(),
                )),
                Scope::Unfiltered => None,
            };

            let outcome = match attribute.kind {
                AttributeKind::Url => self.rewrite_url(&value, scope),
                AttributeKind::Srcset => self.rewrite_srcset(&value, scope),
            };

            match outcome {
                Outcome::Keep => {}
                Outcome::Resolved(resolved) => {
                    el.set_attribute(attribute.name, &resolved)?;
                    self.stats.resolved += 1;
                }
                Outcome::Redirected(target) => {
                    log::debug!("redirected <{} {}=\"{}\">", tag, attribute.name, value);
                    el.set_attribute(attribute.name, &target)?;
                    el.remove_attribute("integrity");
                    self.stats.redirected += 1;
                }
                Outcome::Remove => {
                    log::debug!("removed <{} {}=\"{}\">", tag, attribute.name, value);
                    el.remove();
                    self.stats.blocked += 1;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn rewrite_url(&mut self, value: &str, scope: Option<ResourceType>) -> Outcome {
        let resolution = resolve(value, self.rewriter.origin);

        if let Some(scope) = scope {
            match self.decide(resolution.as_str(), scope) {
                MatchDecision::Block => return Outcome::Remove,
                MatchDecision::Redirect(target) => return Outcome::Redirected(target),
                MatchDecision::Allow => {}
            }
        }

        if resolution.is_resolved() {
            Outcome::Resolved(resolution.into_string())
        } else {
            Outcome::Keep
        }
    }

    /// Any blocked candidate removes the element.
    fn rewrite_srcset(&mut self, value: &str, scope: Option<ResourceType>) -> Outcome {
        let mut candidates = resolve_srcset(value, self.rewriter.origin);
        let mut changed = candidates.iter().any(|c| c.resolved);
        let mut redirected = false;

        if let Some(scope) = scope {
            for candidate in &mut candidates {
                match self.decide(&candidate.url, scope) {
                    MatchDecision::Block => return Outcome::Remove,
                    MatchDecision::Redirect(target) => {
                        candidate.url = target;
                        redirected = true;
                        changed = true;
                    }
                    MatchDecision::Allow => {}
                }
            }
        }

        match (changed, redirected) {
            (_, true) => Outcome::Redirected(join_srcset(&candidates)),
            (true, false) => Outcome::Resolved(join_srcset(&candidates)),
            (false, false) => Outcome::Keep,
        }
    }

    /// Directory-relative references are matched in their absolute form.
    /// Non-http(s) references are never matched.
    fn decide(&mut self, reference: &str, scope: ResourceType) -> MatchDecision {
        let origin = self.rewriter.origin;
        let Some(url) = origin.absolutize(reference) else {
            return MatchDecision::Allow;
        };
        let ctx = MatchContext {
            url: &url,
            scope,
            document_host: origin.host(),
        };
        let result = self.rewriter.matcher.match_reference(&ctx);
        if result.source == MatchSource::Exception {
            self.excepted = true;
        }
        result.decision
    }
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use adless_compiler::compile;

    fn rewrite_with(rules: &str, url: &str, html: &str, options: RewriteOptions) -> (String, Rewritten) {
        let rule_set = compile(rules).expect("rules compile").rule_set;
        let origin = Origin::parse(url).expect("valid url");
        let out = Rewriter::new(&origin, &rule_set, options)
            .rewrite(html.as_bytes())
            .expect("rewrite succeeds");
        (String::from_utf8_lossy(&out.body).into_owned(), out)
    }

    fn rewrite(rules: &str, html: &str) -> (String, Rewritten) {
        rewrite_with(rules, "https://example.com/page", html, RewriteOptions::default())
    }

    #[test]
    fn resolves_attributes_and_injects_base() {
        let (html, out) = rewrite(
            "",
            r#"<html><head><title>t</title></head><body><img src="/img/logo.png"><script src="//cdn.example.com/x.js"></script></body></html>"#,
        );
        assert!(html.contains(r#"<img src="https://example.com/img/logo.png">"#));
        assert!(html.contains(r#"<script src="https://cdn.example.com/x.js"></script>"#));
        assert!(html.contains(r#"<head><base href="https://example.com/page"><title>"#));
        assert_eq!(out.stats.resolved, 2);
        assert!(out.stats.base_injected);
    }

    #[test]
    fn keeps_existing_base() {
        let (html, out) = rewrite("", r#"<head><base href="/docs/"></head><a href="x.html">x</a>"#);
        assert!(html.contains(r#"<base href="https://example.com/docs/">"#));
        assert_eq!(html.matches("<base").count(), 1);
        assert!(!out.stats.base_injected);
        assert!(html.contains(r#"<a href="x.html">"#));
    }

    #[test]
    fn injects_into_html_or_before_first_element() {
        let (html, _) = rewrite("", "<html><body><p>hi</p></body></html>");
        assert!(html.starts_with(r#"<html><base href="https://example.com/page"><body>"#));

        let (html, _) = rewrite("", "<!doctype html><p>hi</p>");
        assert_eq!(html, r#"<!doctype html><base href="https://example.com/page"><p>hi</p>"#);
    }

    #[test]
    fn blocked_element_is_removed_with_content() {
        let (html, out) = rewrite(
            "||ads.example.net^",
            r#"<body><iframe src="https://ads.example.net/frame"><p>fallback</p></iframe><p>keep</p></body>"#,
        );
        assert!(!html.contains("iframe"));
        assert!(!html.contains("fallback"));
        assert!(html.contains("<p>keep</p>"));
        assert_eq!(out.stats.blocked, 1);
    }

    #[test]
    fn scope_restricts_removal() {
        let (html, _) = rewrite(
            "||cdn.example.net/lib$script",
            r#"<script src="https://cdn.example.net/lib.js"></script><img src="https://cdn.example.net/lib.png">"#,
        );
        assert!(!html.contains("<script"));
        assert!(html.contains("<img"));
    }

    #[test]
    fn redirect_replaces_value_and_drops_integrity() {
        let (html, out) = rewrite(
            "||tracker.example.net/analytics.js$script,redirect=noopjs",
            r#"<script src="https://tracker.example.net/analytics.js" integrity="sha384-abc" async></script>"#,
        );
        assert!(html.contains(r#"src="data:text/javascript,""#));
        assert!(!html.contains("integrity"));
        assert!(html.contains("async"));
        assert_eq!(out.stats.redirected, 1);
    }

    #[test]
    fn exception_keeps_element() {
        let (html, _) = rewrite(
            "||ads.example.net^\n@@||ads.example.net/consent.js",
            r#"<script src="https://ads.example.net/consent.js"></script><script src="https://ads.example.net/banner.js"></script>"#,
        );
        assert!(html.contains("consent.js"));
        assert!(!html.contains("banner.js"));
    }

    #[test]
    fn relative_paths_are_matched_but_left_in_place() {
        let (html, _) = rewrite(
            "/banners/*$image",
            r#"<img src="banners/top.gif"><img src="images/logo.gif">"#,
        );
        assert!(!html.contains("top.gif"));
        assert!(html.contains(r#"<img src="images/logo.gif">"#));
    }

    #[test]
    fn srcset_candidates_resolved_or_element_removed() {
        let (html, _) = rewrite("", r#"<img srcset="/a.png 1x, //cdn.example.com/b.png 2x">"#);
        assert!(html.contains(r#"srcset="https://example.com/a.png 1x, https://cdn.example.com/b.png 2x""#));

        let (html, _) = rewrite(
            "||ads.example.net^",
            r#"<picture><source srcset="/a.png 1x, https://ads.example.net/b.png 2x"><img src="/a.png"></picture>"#,
        );
        assert!(!html.contains("<source"));
        assert!(html.contains(r#"<img src="https://example.com/a.png">"#));
    }

    #[test]
    fn style_text_and_attributes_are_resolved() {
        let (html, out) = rewrite(
            "",
            r#"<style>body { background: url("/bg.png") } .x > .y { color: red }</style><div style="background:url(/tile.png)"></div>"#,
        );
        assert!(html.contains(r#"url("https://example.com/bg.png")"#));
        assert!(html.contains(".x > .y"));
        assert!(html.contains(r#"style="background:url(https://example.com/tile.png)""#));
        assert_eq!(out.stats.resolved, 2);
    }

    #[test]
    fn link_scope_follows_rel() {
        let rules = "||static.example.net^$stylesheet";
        let (html, _) = rewrite(
            rules,
            r#"<link rel="stylesheet" href="https://static.example.net/a.css"><link rel="icon" href="https://static.example.net/favicon.ico">"#,
        );
        assert!(!html.contains("a.css"));
        assert!(html.contains("favicon.ico"));
    }

    #[test]
    fn cosmetic_stylesheet_injected_once() {
        let rules = "##.banner-slot\nexample.com##.promo-box";
        let (html, out) = rewrite(rules, "<html><head></head><body></body></html>");
        assert!(out.stats.cosmetic_injected);
        assert!(html.contains("<style data-adless-cosmetic>"));
        assert!(html.contains(".promo-box"));
        assert!(html.contains(".banner-slot"));

        let (again, out) = rewrite(rules, &html);
        assert_eq!(again, html);
        assert!(!out.stats.cosmetic_injected);
        assert!(!out.stats.base_injected);
    }

    #[test]
    fn name_signatures_remove_elements() {
        let html_in = r#"<body><div class="sidebar ad-slot">x</div><div id="header">h</div></body>"#;
        let (html, out) = rewrite("", html_in);
        assert!(!html.contains("ad-slot"));
        assert!(html.contains(r#"id="header""#));
        assert_eq!(out.stats.hidden_by_signature, 1);

        let options = RewriteOptions {
            builtin_signatures: false,
            ..RewriteOptions::default()
        };
        let (html, out) = rewrite_with("", "https://example.com/page", html_in, options);
        assert!(html.contains("ad-slot"));
        assert_eq!(out.stats.hidden_by_signature, 0);
    }

    #[test]
    fn exception_outranks_name_signature() {
        let rules = "@@||cdn.example.org^";
        let (html, out) = rewrite(rules, r#"<img class="ad" src="https://cdn.example.org/hero.jpg"><div class="ad">x</div>"#);
        assert!(html.contains(r#"<img class="ad" src="https://cdn.example.org/hero.jpg">"#));
        assert!(!html.contains("<div"));
        assert_eq!(out.stats.hidden_by_signature, 1);
    }

    #[test]
    fn srcset_url_with_commas_is_one_candidate() {
        let srcset = "https://res.cloudinary.com/d/image/upload/w_200,h_100/x.jpg 2x";
        let html_in = format!(r#"<img srcset="{}">"#, srcset);

        let (html, _) = rewrite("", &html_in);
        assert!(html.contains(&format!(r#"srcset="{}""#, srcset)));

        let (html, out) = rewrite("/h_100/*$image", &html_in);
        assert!(html.contains("<img"));
        assert_eq!(out.stats.blocked, 0);
    }

    #[test]
    fn base_without_href_does_not_suppress_injection() {
        let (html, out) = rewrite("", r#"<head><base target="_blank"></head><a href="x.html">x</a>"#);
        assert!(html.contains(r#"<head><base href="https://example.com/page"><base target="_blank">"#));
        assert!(out.stats.base_injected);
    }

    #[test]
    fn document_exception_disables_filtering() {
        let rules = "||ads.example.net^\n##.promo\n@@||example.com^$document";
        let (html, out) = rewrite(
            rules,
            r#"<head></head><img src="https://ads.example.net/x.gif"><img src="/logo.png">"#,
        );
        assert!(html.contains("ads.example.net"));
        assert!(html.contains("https://example.com/logo.png"));
        assert!(!out.stats.cosmetic_injected);
        assert!(out.csp.is_empty());
    }

    #[test]
    fn csp_is_returned_not_embedded() {
        let (html, out) = rewrite("||example.com^$csp=script-src 'self'", "<head></head><p>x</p>");
        assert_eq!(out.csp.header_value().as_deref(), Some("script-src 'self'"));
        assert!(!html.contains("script-src"));
    }

    #[test]
    fn base_href_is_escaped() {
        let (html, _) = rewrite_with("", "https://example.com/search?q=a&b=\"c\"", "<head></head>", RewriteOptions::default());
        assert!(html.contains("&amp;"));
        assert!(!html.contains("\"c\""));
    }
}
