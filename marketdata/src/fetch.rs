use async_trait::async_trait;

use crate::types::{BookSnapshot, Instrument};

/// Abstraction over the exchange connector's snapshot endpoint.
///
/// The cache owns all retry/stale-fallback policy; implementations should
/// simply attempt one fetch and report failure through `Err`.
#[async_trait]
pub trait BookFetcher: Send + Sync + 'static {
    async fn fetch_book(
        &self,
        instrument: &Instrument,
        depth: usize,
    ) -> anyhow::Result<BookSnapshot>;
}
