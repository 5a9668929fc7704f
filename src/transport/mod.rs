// Transport module
// Outbound HTTP plumbing shared by the remote sampler, RFQ makers and the
// pool metadata service
//
// Numan Thabit 2025 Nov

pub mod http;

pub use http::{HttpClient, RetryPolicy};
