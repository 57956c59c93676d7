//! Pipeline Orchestrator
//!
//! `run` validates the requested URL, refuses payloads that are not markup,
//! and hands the document to the [`Rewriter`]. `run_or_passthrough` turns the
//! "not markup" case into an unmodified passthrough.

use adless_core::{Origin, RuleSet, UrlError};

use crate::options::RewriteOptions;
use crate::rewriter::{CspDirectiveSet, RewriteStats, Rewriter};

/// Bytes inspected for a NUL when deciding whether a payload is binary.
const SNIFF_LEN: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unparsable document: {0}")]
    UnparsableDocument(String),
    #[error(transparent)]
    UnresolvableUrl(#[from] UrlError),
    #[error("Rewrite failed: {0}")]
    Rewrite(String),
}

/// Raw document payload with its declared content type, if any.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub bytes: &'a [u8],
    pub content_type: Option<&'a str>,
}

impl<'a> Document<'a> {
    pub fn new(bytes: &'a [u8], content_type: Option<&'a str>) -> Self {
        Self { bytes, content_type }
    }

    /// A payload with no declared content type.
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self::new(bytes, None)
    }

    /// Fails when the payload cannot be treated as markup.
    fn check_markup(&self) -> Result<(), PipelineError> {
        if let Some(content_type) = self.content_type {
            let mime = content_type
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            if !mime.is_empty() && mime != "text/html" && mime != "application/xhtml+xml" {
                return Err(PipelineError::UnparsableDocument(format!(
                    "content type '{}' is not markup",
                    mime
                )));
            }
        }

        let head = &self.bytes[..self.bytes.len().min(SNIFF_LEN)];
        if head.contains(&0) {
            return Err(PipelineError::UnparsableDocument("binary payload".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub body: Vec<u8>,
    pub csp: CspDirectiveSet,
    pub stats: RewriteStats,
    /// `body` is the original payload, untouched
    pub passthrough: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: RewriteOptions,
}

impl Pipeline {
    pub fn new(options: RewriteOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    /// Rewrite a fetched document for `requested_url`.
    pub fn run(
        &self,
        rule_set: &RuleSet,
        requested_url: &str,
        document: &Document<'_>,
    ) -> Result<PipelineOutput, PipelineError> {
        let origin = Origin::parse(requested_url)?;
        document.check_markup()?;

        let rewritten = Rewriter::new(&origin, rule_set, self.options)
            .rewrite(document.bytes)
            .map_err(|e| PipelineError::Rewrite(e.to_string()))?;

        log::debug!(
            "rewrote {} ({} bytes): {} resolved, {} blocked, {} redirected, {} hidden",
            origin.document_url(),
            document.bytes.len(),
            rewritten.stats.resolved,
            rewritten.stats.blocked,
            rewritten.stats.redirected,
            rewritten.stats.hidden_by_signature,
        );

        Ok(PipelineOutput {
            body: rewritten.body,
            csp: rewritten.csp,
            stats: rewritten.stats,
            passthrough: false,
        })
    }

    /// Like [`Pipeline::run`], but a payload that is not markup comes back unmodified.
    pub fn run_or_passthrough(
        &self,
        rule_set: &RuleSet,
        requested_url: &str,
        document: &Document<'_>,
    ) -> Result<PipelineOutput, PipelineError> {
        match self.run(rule_set, requested_url, document) {
            Err(PipelineError::UnparsableDocument(reason)) => {
                log::debug!("passing {} through unmodified: {}", requested_url, reason);
                Ok(PipelineOutput {
                    body: document.bytes.to_vec(),
                    csp: CspDirectiveSet::default(),
                    stats: RewriteStats::default(),
                    passthrough: true,
                })
            }
            other => other,
        }
    }
}
