//! Provider-facing half of the review pipeline's external interfaces: the
//! VCS REST clients (GitHub/GitLab/Bitbucket) and the unified-diff parser
//! they share, plus the bridge that lets `review-core`'s workflow engine
//! drive them through its `ProviderAdapter` capability.
//!
//! The RAG/AST/prompt-orchestration pipeline this crate used to own (steps
//! 2-4 of the original `run_review`) has moved to `review-core`'s own
//! analyzer set, judge, and workflow engine; this crate is now scoped to
//! what the specification keeps as an external collaborator (§1): VCS
//! adapters.

pub mod errors;
pub mod git_providers;
pub mod parser;
pub mod review_core_adapter;

pub use git_providers::{ProviderClient, ProviderConfig, ProviderKind};
