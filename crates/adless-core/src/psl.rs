//! Registrable-domain (eTLD+1) helpers
//!
//! Used for `$third-party` checks and for walking host suffixes when
//! looking up hostname rules, `$domain=` constraints and cosmetic filters.
//!
//! # Examples
//!
//! ```
//! use adless_core::psl::get_etld1;
//!
//! assert_eq!(get_etld1("sub.example.com"), "example.com");
//! assert_eq!(get_etld1("sub.example.co.uk"), "example.co.uk");
//! ```

/// Common two-part public suffixes.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Get the eTLD+1 (registrable domain) for a hostname.
pub fn get_etld1(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    etld1_slice(&host).to_string()
}

/// eTLD+1 as a suffix slice of an already-lowercased host.
fn etld1_slice(host: &str) -> &str {
    let labels: Vec<&str> = host.split('.').collect();
    let n = labels.len();
    if n <= 2 {
        return host;
    }

    let last_two_len = labels[n - 2].len() + 1 + labels[n - 1].len();
    let last_two = &host[host.len() - last_two_len..];
    let keep = if COMMON_TWO_PART_TLDS.contains(&last_two) { 3 } else { 2 };

    let keep_len: usize = labels[n - keep..].iter().map(|l| l.len()).sum::<usize>() + keep - 1;
    &host[host.len() - keep_len..]
}

/// Check if two hosts share the same eTLD+1.
pub fn is_same_site(host1: &str, host2: &str) -> bool {
    get_etld1(host1) == get_etld1(host2)
}

/// Check if a reference is third-party relative to its document.
pub fn is_third_party(document_host: &str, reference_host: &str) -> bool {
    !document_host.is_empty() && !is_same_site(document_host, reference_host)
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator for suffix-walking a host from full to eTLD+1.
pub struct HostSuffixIter<'a> {
    current: &'a str,
    etld1_len: usize,
}

impl<'a> HostSuffixIter<'a> {
    /// The host must already be lowercase.
    pub fn new(host: &'a str) -> Self {
        Self {
            current: host,
            etld1_len: etld1_slice(host).len(),
        }
    }
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_empty() || self.current.len() < self.etld1_len {
            return None;
        }

        let result = self.current;

        self.current = match get_parent_domain(self.current) {
            Some(parent) if parent.len() >= self.etld1_len => parent,
            _ => "",
        };

        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific (down to eTLD+1).
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    HostSuffixIter::new(host)
}

/// Whether `host` equals `domain` or is a subdomain of it.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}
