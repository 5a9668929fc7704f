// Library root module for swap-aggr
// This file defines the public API and module structure for the swap-aggr library
// It exports the liquidity sampling, path optimization and quote routing
// functionality that can be used by other crates
//
// Numan Thabit 2025 Nov

pub mod cache;
pub mod config;
pub mod control;
pub mod errors;
pub mod fees;
pub mod metrics;
pub mod quant;
pub mod rfq;
pub mod router;
pub mod sampler;
pub mod transport;
pub mod types;
pub mod venues;
