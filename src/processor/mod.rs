use async_trait::async_trait;

pub mod simulator;

/// Outcome of one payment attempt at a processor.
#[derive(Debug, Clone)]
pub struct ProcessorResult {
    pub success: bool,
    pub response_code: String,
    pub response_message: String,
}

/// Contract of a processor RPC: execute one attempt and report the result.
/// Declines are data, not errors; a timeout surfaces as a non-success
/// result. Implementations must be safe to call concurrently.
#[async_trait]
pub trait ProcessorAdapter: Send + Sync {
    async fn process(
        &self,
        decline_code: &str,
        attempt_number: u32,
        processor: &str,
    ) -> ProcessorResult;
}
