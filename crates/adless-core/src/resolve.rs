//! URL Resolver
//!
//! Turns root-relative and protocol-relative references found in a document
//! into absolute URLs, using the origin of the requested document.
//!
//! Only two forms are rewritten:
//!
//! 1. `//host/path` (protocol-relative) gets the document protocol prepended.
//! 2. `/path` (root-relative) gets `scheme://host[:port]` prepended.
//!
//! Absolute references and everything else (`data:`, `javascript:`, fragments,
//! directory-relative paths) are left untouched; the injected `<base>` element
//! takes care of the latter in the client.

use std::borrow::Cow;

use url::Url;

/// The requested document URL could not be used as a resolution base.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("Unresolvable URL '{url}': {reason}")]
    Unresolvable { url: String, reason: String },
    #[error("Unsupported scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

// =============================================================================
// Origin
// =============================================================================

/// Resolution base derived from the requested document URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    scheme: String,
    host: String,
    base: String,
    document_url: String,
    url: Url,
}

impl Origin {
    /// Parse the requested URL. Fails before any fetch is attempted.
    pub fn parse(requested: &str) -> Result<Self, UrlError> {
        let trimmed = requested.trim();
        let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::Unresolvable {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = parsed.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(UrlError::UnsupportedScheme(scheme));
        }

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(UrlError::MissingHost(trimmed.to_string())),
        };

        // Url::port() is None for the scheme's default port
        let base = match parsed.port() {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        };

        parsed.set_fragment(None);

        Ok(Self {
            scheme,
            host,
            base,
            document_url: parsed.to_string(),
            url: parsed,
        })
    }

    /// Document scheme without the colon (`https`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Document protocol with the colon (`https:`).
    pub fn protocol(&self) -> String {
        format!("{}:", self.scheme)
    }

    /// Document hostname.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// `scheme://host[:port]`
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The normalized requested URL, fragment stripped.
    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    /// Full RFC 3986 resolution of a reference, for matching only.
    ///
    /// Directory-relative paths are resolved here too, but callers never write
    /// this form back into the document. `None` for fragment-only references
    /// and non-http(s) results (`data:`, `javascript:`, `mailto:`).
    pub fn absolutize(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with('#') {
            return None;
        }
        let joined = self.url.join(reference).ok()?;
        match joined.scheme() {
            "http" | "https" => Some(joined.into()),
            _ => None,
        }
    }
}

// =============================================================================
// Reference Resolution
// =============================================================================

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Already absolute, or a form this resolver does not touch
    Unchanged(&'a str),
    /// Rewritten into an absolute URL
    Resolved(String),
}

impl Resolution<'_> {
    pub fn as_str(&self) -> &str {
        match self {
            Resolution::Unchanged(s) => s,
            Resolution::Resolved(s) => s,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn into_string(self) -> String {
        match self {
            Resolution::Unchanged(s) => s.to_string(),
            Resolution::Resolved(s) => s,
        }
    }
}

/// Resolve a reference against the document origin.
pub fn resolve<'a>(reference: &'a str, origin: &Origin) -> Resolution<'a> {
    let trimmed = reference.trim();

    if trimmed.starts_with("//") {
        return Resolution::Resolved(format!("{}:{}", origin.scheme, trimmed));
    }

    if trimmed.starts_with('/') {
        return Resolution::Resolved(format!("{}{}", origin.base, trimmed));
    }

    Resolution::Unchanged(reference)
}

// =============================================================================
// CSS url(...) rewriting
// =============================================================================

/// Rewrite every `url(...)` whose inner path starts with `/` into absolute form.
///
/// Quoting is preserved. Returns the input unchanged when nothing needed rewriting.
pub fn rewrite_css_urls<'a>(css: &'a str, origin: &Origin) -> Cow<'a, str> {
    let bytes = css.as_bytes();
    let mut out = String::new();
    let mut last = 0;
    let mut pos = 0;

    while let Some(found) = find_ascii_ci(&bytes[pos..], b"url(") {
        let open = pos + found + 4;
        let mut inner_start = open;
        while inner_start < bytes.len() && bytes[inner_start].is_ascii_whitespace() {
            inner_start += 1;
        }

        let quote = match bytes.get(inner_start) {
            Some(&q @ (b'"' | b'\'')) => {
                inner_start += 1;
                Some(q)
            }
            _ => None,
        };

        let inner_end = match quote {
            Some(q) => bytes[inner_start..].iter().position(|&b| b == q).map(|p| inner_start + p),
            None => bytes[inner_start..].iter().position(|&b| b == b')').map(|p| {
                let close = inner_start + p;
                inner_start + css[inner_start..close].trim_end().len()
            }),
        };

        let inner_end = match inner_end {
            Some(end) => end,
            None => break,
        };

        let inner = &css[inner_start..inner_end];
        if inner.starts_with('/') {
            if let Resolution::Resolved(absolute) = resolve(inner, origin) {
                out.push_str(&css[last..inner_start]);
                out.push_str(&absolute);
                last = inner_end;
            }
        }

        pos = inner_end.max(open);
    }

    if last == 0 {
        return Cow::Borrowed(css);
    }

    out.push_str(&css[last..]);
    Cow::Owned(out)
}

fn find_ascii_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

// =============================================================================
// srcset
// =============================================================================

/// One `srcset` candidate: URL plus optional descriptor (`2x`, `640w`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetCandidate {
    pub url: String,
    pub descriptor: String,
    /// `url` was rewritten by [`resolve`]
    pub resolved: bool,
}

/// Split a `srcset` value and resolve each candidate URL.
///
/// URLs may contain commas (`/w_200,h_100/x.jpg`); a candidate ends at the
/// first comma after its descriptor, or at trailing commas of a bare URL.
pub fn resolve_srcset(value: &str, origin: &Origin) -> Vec<SrcsetCandidate> {
    split_srcset(value)
        .into_iter()
        .map(|(url, descriptor)| {
            let resolution = resolve(url, origin);
            SrcsetCandidate {
                resolved: resolution.is_resolved(),
                url: resolution.into_string(),
                descriptor: descriptor.to_string(),
            }
        })
        .collect()
}

fn split_srcset(value: &str) -> Vec<(&str, &str)> {
    let bytes = value.as_bytes();
    let mut candidates = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b',') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let url_start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let url = &value[url_start..pos];
        let bare = url.trim_end_matches(',');
        if bare.len() != url.len() {
            // trailing commas close the candidate with no descriptor
            if !bare.is_empty() {
                candidates.push((bare, ""));
            }
            continue;
        }

        let descriptor_start = pos;
        let mut depth = 0usize;
        while pos < bytes.len() {
            match bytes[pos] {
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => break,
                _ => {}
            }
            pos += 1;
        }
        candidates.push((url, value[descriptor_start..pos].trim()));
    }

    candidates
}

/// Serialize candidates back into a `srcset` value.
pub fn join_srcset(candidates: &[SrcsetCandidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            if c.descriptor.is_empty() {
                c.url.clone()
            } else {
                format!("{} {}", c.url, c.descriptor)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::parse("https://example.com/page").expect("valid origin")
    }

    #[test]
    fn origin_parses_scheme_host_and_port() {
        let o = origin();
        assert_eq!(o.scheme(), "https");
        assert_eq!(o.protocol(), "https:");
        assert_eq!(o.host(), "example.com");
        assert_eq!(o.base(), "https://example.com");

        let with_port = Origin::parse("http://localhost:8080/a/b#frag").expect("valid origin");
        assert_eq!(with_port.base(), "http://localhost:8080");
        assert_eq!(with_port.document_url(), "http://localhost:8080/a/b");

        let default_port = Origin::parse("https://example.com:443/").expect("valid origin");
        assert_eq!(default_port.base(), "https://example.com");
    }

    #[test]
    fn origin_rejects_bad_urls() {
        assert!(matches!(Origin::parse("not a url"), Err(UrlError::Unresolvable { .. })));
        assert!(matches!(Origin::parse("ftp://example.com/"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(Origin::parse("/relative/path"), Err(UrlError::Unresolvable { .. })));
    }

    #[test]
    fn absolutize_for_matching() {
        let o = Origin::parse("https://example.com/news/page.html").expect("valid origin");
        assert_eq!(o.absolutize("ads/banner.gif").as_deref(), Some("https://example.com/news/ads/banner.gif"));
        assert_eq!(o.absolutize("//cdn.x/a.js").as_deref(), Some("https://cdn.x/a.js"));
        assert_eq!(o.absolutize("#top"), None);
        assert_eq!(o.absolutize("javascript:void(0)"), None);
        assert_eq!(o.absolutize("data:image/gif;base64,R0lG"), None);
    }

    #[test]
    fn resolves_root_relative() {
        let resolved = resolve("/img/logo.png", &origin());
        assert_eq!(resolved, Resolution::Resolved("https://example.com/img/logo.png".to_string()));
    }

    #[test]
    fn resolves_protocol_relative() {
        let resolved = resolve("//cdn.example.com/x.js", &origin());
        assert_eq!(resolved, Resolution::Resolved("https://cdn.example.com/x.js".to_string()));

        let http = Origin::parse("http://example.com/").expect("valid origin");
        assert_eq!(resolve("//cdn.example.com/x.js", &http).as_str(), "http://cdn.example.com/x.js");
    }

    #[test]
    fn protocol_relative_keeps_original_suffix() {
        let o = origin();
        for reference in ["//a", "//a.b/c?d=e#f", "///triple", "//host:81/"] {
            assert_eq!(resolve(reference, &o).as_str(), format!("https:{}", reference));
        }
    }

    #[test]
    fn root_relative_prefixes_scheme_and_host() {
        let o = origin();
        for reference in ["/", "/a", "/a/b?c#d", "/%20"] {
            assert_eq!(resolve(reference, &o).as_str(), format!("https://example.com{}", reference));
        }
    }

    #[test]
    fn leaves_other_forms_unchanged() {
        let o = origin();
        for reference in [
            "https://other.com/x.js",
            "data:image/png;base64,AAAA",
            "javascript:void(0)",
            "#top",
            "img/logo.png",
            "../up.png",
            "?q=1",
            "",
        ] {
            assert_eq!(resolve(reference, &o), Resolution::Unchanged(reference));
        }
    }

    #[test]
    fn resolution_is_idempotent() {
        let o = origin();
        let once = resolve("/a.png", &o).into_string();
        assert_eq!(resolve(&once, &o), Resolution::Unchanged(once.as_str()));
    }

    #[test]
    fn rewrites_css_urls() {
        let o = origin();
        let css = "a{background:url(/bg.png)} b{background:url('/q.png')} c{src:url( \"//cdn.x/f.woff\" )}";
        assert_eq!(
            rewrite_css_urls(css, &o),
            "a{background:url(https://example.com/bg.png)} b{background:url('https://example.com/q.png')} c{src:url( \"https://cdn.x/f.woff\" )}"
        );
    }

    #[test]
    fn css_without_root_relative_urls_is_borrowed() {
        let o = origin();
        let css = "a{background:url(bg.png)} b{background:URL(https://x.com/a.png)} c{color:red}";
        assert!(matches!(rewrite_css_urls(css, &o), Cow::Borrowed(_)));
    }

    #[test]
    fn css_unterminated_url_is_left_alone() {
        let o = origin();
        let css = "a{background:url('/bg.png";
        assert_eq!(rewrite_css_urls(css, &o), css);
    }

    #[test]
    fn srcset_urls_keep_inner_commas() {
        let o = origin();
        let value = "https://res.cloudinary.com/d/image/upload/w_200,h_100/x.jpg 2x, /y.jpg 1x";
        let candidates = resolve_srcset(value, &o);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://res.cloudinary.com/d/image/upload/w_200,h_100/x.jpg");
        assert_eq!(candidates[0].descriptor, "2x");
        assert_eq!(candidates[1].url, "https://example.com/y.jpg");

        let bare = resolve_srcset("/a.jpg, /b.jpg 2x,, ", &o);
        let urls: Vec<&str> = bare.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a.jpg", "https://example.com/b.jpg"]);
        assert_eq!(bare[0].descriptor, "");
        assert_eq!(bare[1].descriptor, "2x");
    }

    #[test]
    fn srcset_candidates_are_resolved() {
        let o = origin();
        let candidates = resolve_srcset("/a.png 1x, //cdn.x/b.png 2x,c.png", &o);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].url, "https://example.com/a.png");
        assert_eq!(candidates[1].url, "https://cdn.x/b.png");
        assert_eq!(candidates[2].descriptor, "");
        assert!(candidates[0].resolved && !candidates[2].resolved);
        assert_eq!(
            join_srcset(&candidates),
            "https://example.com/a.png 1x, https://cdn.x/b.png 2x, c.png"
        );
    }
}
