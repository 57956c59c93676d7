//! Compiled URL patterns
//!
//! A block-list pattern compiles into a short program of literal runs,
//! separator checks (`^`) and wildcards (`*`), plus its anchors. Matching is
//! done directly on bytes, so characters with meaning in regular expressions
//! never need escaping.
//!
//! Programs are split into segments at each wildcard. Every segment has a
//! fixed width (a trailing `^` may also match the end of input), so the
//! leftmost placement of a segment is always the best one and matching needs
//! no backtracking beyond the choice of the first segment's start.

use crate::url::{get_host_position, is_separator_char};

/// Pattern program instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternOp {
    /// Literal byte run (lowercased unless the pattern is case-sensitive)
    Literal(String),
    /// ABP `^`: one separator character, or the end of the URL
    Separator,
    /// `*`: any sequence
    Wildcard,
}

/// Left-side anchoring of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnchorType {
    #[default]
    None,
    /// `|` - match starts at the first character of the URL
    Left,
    /// `||` - match starts at a label boundary inside the hostname
    Hostname,
}

/// A compiled URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    ops: Vec<PatternOp>,
    anchor: AnchorType,
    right_anchor: bool,
    match_case: bool,
    /// `ops` split at each wildcard
    segments: Vec<Vec<Atom>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Atom {
    Literal(Vec<u8>),
    Separator,
}

impl Pattern {
    pub fn new(ops: Vec<PatternOp>, anchor: AnchorType, right_anchor: bool, match_case: bool) -> Self {
        let segments = split_segments(&ops);
        Self {
            ops,
            anchor,
            right_anchor,
            match_case,
            segments,
        }
    }

    pub fn ops(&self) -> &[PatternOp] {
        &self.ops
    }

    pub fn anchor(&self) -> AnchorType {
        self.anchor
    }

    pub fn is_right_anchored(&self) -> bool {
        self.right_anchor
    }

    pub fn is_match_case(&self) -> bool {
        self.match_case
    }

    /// Whether the program contains at least one literal byte.
    pub fn has_literal(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, PatternOp::Literal(lit) if !lit.is_empty()))
    }

    /// Test a URL. `url_lower` must be `url.to_ascii_lowercase()`.
    pub fn matches(&self, url: &str, url_lower: &str) -> bool {
        let hay = if self.match_case { url.as_bytes() } else { url_lower.as_bytes() };
        let (first, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return true,
        };

        // Leading wildcard: the left anchor no longer constrains anything
        if first.is_empty() {
            return rest.is_empty() || self.match_rest(rest, hay, 0);
        }

        let accept = |end: usize| -> bool {
            if rest.is_empty() {
                !self.right_anchor || end == hay.len()
            } else {
                self.match_rest(rest, hay, end)
            }
        };

        match self.anchor {
            AnchorType::Left => match_segment_at(first, hay, 0).is_some_and(&accept),
            AnchorType::Hostname => host_label_starts(url)
                .any(|start| match_segment_at(first, hay, start).is_some_and(&accept)),
            AnchorType::None => {
                let mut from = 0;
                while let Some((start, end)) = find_segment(first, hay, from) {
                    if accept(end) {
                        return true;
                    }
                    from = start + 1;
                }
                false
            }
        }
    }

    fn match_rest(&self, rest: &[Vec<Atom>], hay: &[u8], mut cursor: usize) -> bool {
        let last_idx = rest.len() - 1;
        for (idx, segment) in rest.iter().enumerate() {
            if idx == last_idx && self.right_anchor {
                return (cursor..=hay.len())
                    .any(|start| match_segment_at(segment, hay, start) == Some(hay.len()));
            }

            match find_segment(segment, hay, cursor) {
                Some((_, end)) => cursor = end,
                None => return false,
            }
        }
        true
    }
}

fn split_segments(ops: &[PatternOp]) -> Vec<Vec<Atom>> {
    let mut segments = vec![Vec::new()];
    for op in ops {
        match op {
            PatternOp::Literal(lit) => {
                if let Some(current) = segments.last_mut() {
                    current.push(Atom::Literal(lit.as_bytes().to_vec()));
                }
            }
            PatternOp::Separator => {
                if let Some(current) = segments.last_mut() {
                    current.push(Atom::Separator);
                }
            }
            PatternOp::Wildcard => segments.push(Vec::new()),
        }
    }
    segments
}

/// Positions inside the hostname where a `||` match may begin.
fn host_label_starts(url: &str) -> impl Iterator<Item = usize> + '_ {
    let (host_start, host_end) = get_host_position(url).unwrap_or((1, 0));
    let bytes = url.as_bytes();
    (host_start..host_end).filter(move |&i| i == host_start || bytes[i - 1] == b'.')
}

/// Leftmost placement of a segment at or after `from`; returns `(start, end)`.
fn find_segment(segment: &[Atom], hay: &[u8], from: usize) -> Option<(usize, usize)> {
    if let Some(Atom::Literal(first)) = segment.first() {
        let mut pos = from;
        while pos + first.len() <= hay.len() {
            let start = pos + find_bytes(&hay[pos..], first)?;
            if let Some(end) = match_segment_at(segment, hay, start) {
                return Some((start, end));
            }
            pos = start + 1;
        }
        return None;
    }

    (from..=hay.len()).find_map(|start| match_segment_at(segment, hay, start).map(|end| (start, end)))
}

/// Match a whole segment starting exactly at `start`; returns its end.
fn match_segment_at(segment: &[Atom], hay: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    for atom in segment {
        match atom {
            Atom::Literal(lit) => {
                if !hay.get(pos..)?.starts_with(lit) {
                    return None;
                }
                pos += lit.len();
            }
            Atom::Separator => {
                if pos == hay.len() {
                    continue;
                }
                if !is_separator_char(*hay.get(pos)?) {
                    return None;
                }
                pos += 1;
            }
        }
    }
    Some(pos)
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> PatternOp {
        PatternOp::Literal(s.to_string())
    }

    fn check(pattern: &Pattern, url: &str) -> bool {
        pattern.matches(url, &url.to_ascii_lowercase())
    }

    #[test]
    fn plain_literal_matches_anywhere() {
        let p = Pattern::new(vec![lit("/banner/")], AnchorType::None, false, false);
        assert!(check(&p, "https://example.com/img/banner/1.png"));
        assert!(!check(&p, "https://example.com/img/banners/1.png"));
    }

    #[test]
    fn wildcards_span_any_sequence() {
        let p = Pattern::new(
            vec![PatternOp::Wildcard, lit("doubleclick.net"), PatternOp::Wildcard],
            AnchorType::None,
            false,
            false,
        );
        assert!(check(&p, "https://ad.doubleclick.net/ddm/ad.js"));
        assert!(check(&p, "https://AD.DOUBLECLICK.NET/"));
        assert!(!check(&p, "https://example.com/doubleclick"));
    }

    #[test]
    fn separator_matches_end_and_delimiters() {
        let p = Pattern::new(vec![lit("ads.example.com"), PatternOp::Separator], AnchorType::Hostname, false, false);
        assert!(check(&p, "https://ads.example.com/x"));
        assert!(check(&p, "https://ads.example.com"));
        assert!(check(&p, "https://ads.example.com:8080/x"));
        assert!(check(&p, "https://sub.ads.example.com/x"));
        assert!(!check(&p, "https://ads.example.com.evil.net/x"));
        assert!(!check(&p, "https://badads.example.com/x"));
        assert!(!check(&p, "https://example.com/?u=ads.example.com"));
    }

    #[test]
    fn left_anchor_requires_prefix() {
        let p = Pattern::new(vec![lit("http://ads.")], AnchorType::Left, false, false);
        assert!(check(&p, "http://ads.example.com/"));
        assert!(!check(&p, "https://example.com/?r=http://ads.x"));
    }

    #[test]
    fn right_anchor_requires_suffix() {
        let p = Pattern::new(vec![lit(".swf")], AnchorType::None, true, false);
        assert!(check(&p, "https://example.com/movie.swf"));
        assert!(!check(&p, "https://example.com/movie.swf?x=1"));

        let q = Pattern::new(vec![lit("/ad"), PatternOp::Wildcard, lit(".js")], AnchorType::None, true, false);
        assert!(check(&q, "https://x.com/ad/a.js/b.js"));
        assert!(!check(&q, "https://x.com/ad/a.js?b"));
    }

    #[test]
    fn literal_with_regex_metacharacters() {
        let p = Pattern::new(vec![lit("/ads?id=(1)+")], AnchorType::None, false, false);
        assert!(check(&p, "https://x.com/ads?id=(1)+"));
        assert!(!check(&p, "https://x.com/adsid=1"));
    }

    #[test]
    fn match_case_uses_original_url() {
        let p = Pattern::new(vec![lit("/Banner")], AnchorType::None, false, true);
        assert!(check(&p, "https://x.com/Banner.png"));
        assert!(!check(&p, "https://x.com/banner.png"));
    }

    #[test]
    fn multiple_segments_use_leftmost_placement() {
        let p = Pattern::new(
            vec![lit("a"), PatternOp::Wildcard, lit("b"), PatternOp::Wildcard, lit("c")],
            AnchorType::None,
            false,
            false,
        );
        assert!(check(&p, "https://x/aXbYc"));
        assert!(!check(&p, "https://x/cba"));
    }

    #[test]
    fn has_literal() {
        assert!(!Pattern::new(vec![PatternOp::Wildcard, PatternOp::Separator], AnchorType::None, false, false).has_literal());
        assert!(Pattern::new(vec![lit("x")], AnchorType::None, false, false).has_literal());
    }
}
