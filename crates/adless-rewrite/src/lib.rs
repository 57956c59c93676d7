//! Adless Rewrite
//!
//! Document Rewriter and Pipeline Orchestrator of the adless content proxy.
//!
//! ```no_run
//! use adless_rewrite::{Document, Pipeline};
//! # fn demo(rule_set: &adless_core::RuleSet, html: &[u8]) -> Result<(), adless_rewrite::PipelineError> {
//! let output = Pipeline::default().run_or_passthrough(
//!     rule_set,
//!     "https://example.com/page",
//!     &Document::new(html, Some("text/html")),
//! )?;
//! if let Some(csp) = output.csp.header_value() {
//!     println!("Content-Security-Policy: {}", csp);
//! }
//! # Ok(())
//! # }
//! ```

pub mod elements;
pub mod options;
pub mod pipeline;
pub mod rewriter;

pub use options::RewriteOptions;
pub use pipeline::{Document, Pipeline, PipelineError, PipelineOutput};
pub use rewriter::{CspDirectiveSet, RewriteStats, Rewriter, Rewritten};
