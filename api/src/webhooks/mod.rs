//! Webhook ingress (SPEC_FULL.md C10): signature verification, payload
//! normalization into `PrEvent`/`FeedbackEvent`, and publishing onto the
//! job queue (C9). The HTTP route handlers live in
//! `crate::routes::webhooks`/`crate::routes::feedback`; this module holds
//! the provider-agnostic logic they share.

pub mod feedback;
pub mod normalize;
pub mod verify;
