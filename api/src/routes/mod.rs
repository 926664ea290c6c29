pub mod feedback;
pub mod webhooks;
