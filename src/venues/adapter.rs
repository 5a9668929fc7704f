// Venue adapter module
// Common interface every liquidity source implements so the sampler can
// measure its price curve, plus the registry the sampler looks adapters up in
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::types::{DexSample, Source};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Price model for one source.
///
/// Sell samples take taker amounts as input and report the maker amount
/// received. Buy samples take maker amounts as input and report the taker
/// amount required. An unfillable size reports zero output.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    async fn sample_sell(
        &self,
        taker_token: &str,
        maker_token: &str,
        amounts: &[Decimal],
    ) -> Result<Vec<DexSample>, AggrError>;

    async fn sample_buy(
        &self,
        taker_token: &str,
        maker_token: &str,
        amounts: &[Decimal],
    ) -> Result<Vec<DexSample>, AggrError>;
}

#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<Source, Arc<dyn SourceAdapter>>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry").field("sources", &self.sources()).finish()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own source, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        let source = adapter.source();
        if self.adapters.insert(source, adapter).is_some() {
            info!(%source, "replaced source adapter");
        }
    }

    pub fn get(&self, source: Source) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.get(&source)
    }

    /// Registered sources in a stable order.
    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.adapters.keys().copied().collect();
        sources.sort();
        sources
    }
}

/// Token addresses compare case-insensitively.
pub(crate) fn same_token(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
