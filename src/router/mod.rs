// Router module - path optimization and quote routing plane
// This file wires the fill/path model, the optimizer, the two-phase
// orchestrator and the HTTP API that serves quotes from it
//
// Numan Thabit 2025 Nov

pub mod adjustor;
pub mod comparison;
pub mod fills;
pub mod liquidity;
pub mod optimizer;
pub mod orchestrator;
pub mod path;
pub mod report;
pub mod solver;
pub mod source_filters;
pub mod validation;

#[allow(clippy::module_inception)]
pub mod router;

pub use liquidity::{GetMarketOrdersOpts, MarketSideLiquidity, OptimizerResult, OptimizerResultWithReport};
pub use orchestrator::{ChainRouting, MarketOperationUtils};
pub use path::{Path, PathPenaltyOpts};
pub use router::Router;
pub use solver::{ChunkedDpSolver, Solver};
