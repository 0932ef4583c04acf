//! The asset URL rewriting engine.

pub mod classifier;
pub mod config;
pub mod driver;
pub mod html;
pub mod rewriter;
pub mod scanner;

pub use classifier::{classify, Classification, SkipReason};
pub use config::{Activation, ConfigError, OutputForm, RawOptions, RewriteConfig};
pub use driver::{rewrite, rewrite_bytes, rewrite_with_report, RewriteError, RewriteReport};
pub use scanner::{attribute_kind, Candidate, CandidateContext, Scanner, ValueKind, URL_ATTRIBUTES};
