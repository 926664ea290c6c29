//! Async job runtime: the message-broker capability, the bounded-concurrency
//! worker that drains it with retry/DLQ handling, and the publisher used by
//! webhook ingress to enqueue review requests.
//!
//! This crate is SPEC_FULL.md component C9. It depends on `review-core` for
//! the `Job`/`PrEvent` types the envelope carries but knows nothing about
//! how a job is reviewed — that's supplied by the caller's callback.

pub mod broker;
pub mod publish;
pub mod redis_broker;
pub mod redis_checkpoint;
pub mod redis_cost_ledger;
pub mod worker;

pub use broker::{DlqInfo, InboundMessage, MessageBroker};
pub use publish::publish_review_request;
pub use redis_broker::{RedisBrokerError, RedisStreamBroker};
pub use redis_checkpoint::RedisCheckpointStore;
pub use redis_cost_ledger::RedisCostLedger;
pub use worker::{ReviewWorker, WorkerConfig, WorkerCounters};

use std::future::Future;

use tracing::info;

/// Runs `worker` against `broker` until a SIGINT/SIGTERM is received, then
/// requests a cooperative shutdown and waits for in-flight callbacks to
/// drain. Grounded on the `ctrl_c`/SIGTERM `tokio::select!` pattern used by
/// the pack's long-running server binaries (e.g. dashflow's registry
/// server).
pub async fn run_until_shutdown<B, F, Fut, E>(worker: &ReviewWorker, broker: &B, callback: F)
where
    B: MessageBroker,
    F: Fn(review_core::types::Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send,
    E: std::fmt::Display + Send,
{
    let run_fut = worker.run(broker, callback);
    tokio::pin!(run_fut);

    tokio::select! {
        _ = &mut run_fut => {
            info!("job-runtime: subscription ended on its own");
        }
        _ = shutdown_signal() => {
            info!("job-runtime: shutdown signal received, draining in-flight work");
            worker.request_shutdown();
            run_fut.await;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "job-runtime: failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "job-runtime: failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
