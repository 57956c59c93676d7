//! Built-in signatures
//!
//! A small fixed set of checks that can block without any compiled rule.
//! They are only consulted when no rule matched at all.

/// Host substrings of well-known ad and tracking services.
pub const TRACKING_HOSTS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "google-analytics.com",
    "googletagmanager.com",
    "adservice.google.",
    "amazon-adsystem.com",
    "adnxs.com",
    "adsrvr.org",
    "advertising.com",
    "criteo.com",
    "criteo.net",
    "moatads.com",
    "outbrain.com",
    "pubmatic.com",
    "quantserve.com",
    "rubiconproject.com",
    "scorecardresearch.com",
    "taboola.com",
    "openx.net",
    "hotjar.com",
];

/// Class and id name tokens that mark ad containers.
pub const AD_NAME_TOKENS: &[&str] = &[
    "ad",
    "ads",
    "adv",
    "advert",
    "adverts",
    "advertisement",
    "advertising",
    "adsbygoogle",
    "adslot",
    "adunit",
    "adbox",
    "adbanner",
    "sponsor",
    "sponsored",
    "promoted",
];

/// Elements never removed by a name signature.
const STRUCTURAL_ELEMENTS: &[&str] = &["html", "head", "body", "main", "title", "meta", "base", "style"];

/// Returns the matching tracking signature for a (lowercase) host.
pub fn match_host(host: &str) -> Option<&'static str> {
    TRACKING_HOSTS.iter().copied().find(|sig| host.contains(sig))
}

/// Returns the ad token found in a single class or id name.
///
/// Names are split on `-` and `_`; a token must match exactly, so
/// `header` or `download` never count as `ad`.
pub fn match_name(name: &str) -> Option<&'static str> {
    name.split(|c| c == '-' || c == '_')
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            AD_NAME_TOKENS
                .iter()
                .copied()
                .find(|sig| sig.eq_ignore_ascii_case(token))
        })
}

pub fn is_structural_element(tag: &str) -> bool {
    STRUCTURAL_ELEMENTS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}
