pub mod idempotency;
pub mod ingest;
pub mod processor;
pub mod publisher;
pub mod reconciler;

pub use idempotency::{ClaimOutcome, IdempotencyGate};
pub use ingest::{IngestWorker, RetryPolicy};
pub use processor::OrderProcessor;
pub use publisher::CompletionPublisher;
pub use reconciler::DltReconciler;
