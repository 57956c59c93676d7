use adless_core::pattern::{AnchorType as PatternAnchor, Pattern, PatternOp};
use adless_core::psl::get_etld1;
use adless_core::ruleset::{CosmeticRule, Rule, RuleIndex, RuleMatcher, RuleSet};
use adless_core::types::{ResourceType, RuleAction, RuleFlags};
use adless_core::url::MIN_TOKEN_LEN;

use crate::parser::{AnchorType, CompiledRule};

/// URL scheme names never appear among URL tokens.
const SCHEME_TOKENS: &[&str] = &["http", "https", "wss"];

pub fn build_rule_set(rules: &[CompiledRule], cosmetics: Vec<CosmeticRule>) -> RuleSet {
    let mut index = RuleIndex::default();
    let mut compiled = Vec::with_capacity(rules.len());

    for (rule_id, rule) in rules.iter().enumerate() {
        let matcher = match (&rule.host, &rule.pattern) {
            (Some(host), _) => RuleMatcher::Host(host.clone()),
            (None, Some(pattern)) => RuleMatcher::Pattern(compile_pattern(
                pattern,
                rule.anchor_type,
                rule.right_anchor,
                rule.flags.contains(RuleFlags::MATCH_CASE),
            )),
            (None, None) => RuleMatcher::Any,
        };

        if rule.is_document_level() {
            index.insert_document(rule_id);
        }
        // `@@…$document,script` also excepts script references
        let network = !rule.is_document_level()
            || (!rule.flags.intersects(RuleFlags::ELEMHIDE | RuleFlags::GENERICHIDE)
                && rule.action != RuleAction::CspInject
                && !(rule.scope - ResourceType::DOCUMENT).is_empty());
        if network {
            insert_network_rule(&mut index, rule_id, &matcher);
        }

        compiled.push(Rule {
            raw: rule.raw.clone(),
            action: rule.action,
            flags: rule.flags,
            matcher,
            list_id: rule.list_id,
            scope: rule.scope,
            party: rule.party,
            domains: rule.domain_constraints.clone(),
            redirect: rule.redirect.clone(),
            csp: rule.csp.clone(),
        });
    }

    log::debug!(
        "index: {} host keys, {} token keys, {} unindexed",
        index.host_keys(),
        index.token_keys(),
        index.unindexed_len()
    );

    RuleSet::new(compiled, index, cosmetics)
}

fn insert_network_rule(index: &mut RuleIndex, rule_id: usize, matcher: &RuleMatcher) {
    match matcher {
        RuleMatcher::Host(host) if is_walkable_host(host) => index.insert_host(host, rule_id),
        RuleMatcher::Pattern(pattern) => match select_token(pattern, index) {
            Some(token) => index.insert_token(&token, rule_id),
            None => index.insert_unindexed(rule_id),
        },
        _ => index.insert_unindexed(rule_id),
    }
}

/// Whether a suffix walk from any subdomain reaches `host`.
fn is_walkable_host(host: &str) -> bool {
    get_etld1(&format!("x.{}", host)).len() <= host.len()
}

/// Compile a pattern body (anchors already stripped) into a matching program.
pub fn compile_pattern(body: &str, anchor_type: AnchorType, right_anchor: bool, match_case: bool) -> Pattern {
    let text = if match_case {
        body.to_string()
    } else {
        body.to_ascii_lowercase()
    };

    let mut ops = Vec::new();
    let mut literal = String::new();

    for ch in text.chars() {
        match ch {
            '*' => {
                flush_literal(&mut ops, &mut literal);
                if ops.last() != Some(&PatternOp::Wildcard) {
                    ops.push(PatternOp::Wildcard);
                }
            }
            '^' => {
                flush_literal(&mut ops, &mut literal);
                ops.push(PatternOp::Separator);
            }
            _ => literal.push(ch),
        }
    }
    flush_literal(&mut ops, &mut literal);

    // A trailing wildcard cancels the end anchor
    let right_anchor = right_anchor && ops.last() != Some(&PatternOp::Wildcard);
    if !right_anchor && ops.last() == Some(&PatternOp::Wildcard) {
        ops.pop();
    }

    let anchor = match anchor_type {
        AnchorType::None => PatternAnchor::None,
        AnchorType::Left => PatternAnchor::Left,
        AnchorType::Hostname => PatternAnchor::Hostname,
    };

    Pattern::new(ops, anchor, right_anchor, match_case)
}

fn flush_literal(ops: &mut Vec<PatternOp>, literal: &mut String) {
    if !literal.is_empty() {
        ops.push(PatternOp::Literal(std::mem::take(literal)));
    }
}

/// Pick the least-used token that any matching URL must contain as a whole
/// alphanumeric run.
///
/// A run qualifies when both of its ends are fixed by the pattern: a
/// non-alphanumeric literal byte, a `^`, or an anchor. Runs touching a
/// wildcard (or an unanchored edge) may be part of a longer run in the URL.
fn select_token(pattern: &Pattern, index: &RuleIndex) -> Option<String> {
    let ops = pattern.ops();
    let mut best: Option<(usize, String)> = None;

    for (op_index, op) in ops.iter().enumerate() {
        let PatternOp::Literal(literal) = op else {
            continue;
        };
        let bytes = literal.as_bytes();

        let left_fixed = match op_index.checked_sub(1).map(|i| &ops[i]) {
            Some(PatternOp::Separator) => true,
            Some(_) => false,
            None => pattern.anchor() != PatternAnchor::None,
        };
        let right_fixed = match ops.get(op_index + 1) {
            Some(PatternOp::Separator) => true,
            Some(_) => false,
            None => pattern.is_right_anchored(),
        };

        let mut start = 0;
        while start < bytes.len() {
            if !bytes[start].is_ascii_alphanumeric() {
                start += 1;
                continue;
            }
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
                end += 1;
            }

            let bounded = (start > 0 || left_fixed) && (end < bytes.len() || right_fixed);
            if bounded && end - start >= MIN_TOKEN_LEN {
                let token = literal[start..end].to_ascii_lowercase();
                if !SCHEME_TOKENS.contains(&token.as_str()) {
                    let count = index.token_count(&token);
                    let better = match &best {
                        Some((best_count, best_token)) => {
                            count < *best_count || (count == *best_count && token.len() > best_token.len())
                        }
                        None => true,
                    };
                    if better {
                        best = Some((count, token));
                    }
                }
            }
            start = end;
        }
    }

    best.map(|(_, token)| token)
}
