// Remote sampler
// Posts an op batch to an external sampling service and decodes one result
// per op
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::sampler::{Sampler, SamplerOp, SamplerOutput};
use crate::transport::http::HttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Serialize)]
struct BatchRequest<'a> {
    ops: &'a [SamplerOp],
}

#[derive(Deserialize)]
struct BatchResponse {
    results: Vec<OpResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum OpResult {
    Ok(SamplerOutput),
    Err(String),
}

#[derive(Debug, Clone)]
pub struct HttpSampler {
    client: HttpClient,
}

impl HttpSampler {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Sampler for HttpSampler {
    async fn execute_batch(&self, ops: Vec<SamplerOp>) -> Vec<Result<SamplerOutput, AggrError>> {
        let fail_all = |reason: String| -> Vec<Result<SamplerOutput, AggrError>> {
            ops.iter().map(|_| Err(AggrError::Transport(reason.clone()))).collect()
        };

        let req = BatchRequest { ops: &ops };
        let resp: BatchResponse = match self.client.post_json("batch", "sampler_batch", &req).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, ops = ops.len(), "sampler batch failed");
                return fail_all(err.to_string());
            }
        };
        if resp.results.len() != ops.len() {
            warn!(expected = ops.len(), got = resp.results.len(), "sampler batch result length mismatch");
            return fail_all(format!("expected {} results, got {}", ops.len(), resp.results.len()));
        }
        resp.results
            .into_iter()
            .map(|r| match r {
                OpResult::Ok(output) => Ok(output),
                OpResult::Err(reason) => Err(AggrError::Provider(reason)),
            })
            .collect()
    }
}
