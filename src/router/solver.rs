// Combinatorial solver boundary
// The optimizer hands the solver one sampled curve per candidate and gets back
// an allocated input and predicted output per curve. Values cross this
// boundary as f64.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::types::Side;
use serde::{Deserialize, Serialize};

/// Relative slack allowed past a curve's last sampled input.
const INPUT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedCurve {
    pub ids: Vec<String>,
    pub inputs: Vec<f64>,
    pub outputs: Vec<f64>,
    /// Fixed fee in output units charged once if the curve is used at all.
    pub output_fees: Vec<f64>,
    pub is_vip: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub side: Side,
    pub curves: &'a [SerializedCurve],
    pub target_input: f64,
    pub num_samples: usize,
    /// Leave every non-VIP curve unallocated.
    pub vip_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub input: f64,
    pub output: f64,
}

/// Pure allocation strategy. Called once per VIP restriction level, so it
/// must not keep state between calls.
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    /// One allocation per curve, in curve order.
    fn solve(&self, req: &RouteRequest<'_>) -> Result<Vec<Allocation>, AggrError>;
}

/// Reference solver: splits the target into `num_samples` equal chunks and
/// runs an exact dynamic program over how many chunks each curve receives.
/// Maximizes the number of chunks placed first, then the fee-adjusted output
/// (sells) or negated fee-adjusted cost (buys).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkedDpSolver;

#[derive(Debug, Clone, Copy)]
struct Step {
    score: f64,
    output: f64,
}

impl Solver for ChunkedDpSolver {
    fn name(&self) -> &'static str {
        "chunked-dp"
    }

    fn solve(&self, req: &RouteRequest<'_>) -> Result<Vec<Allocation>, AggrError> {
        if !req.target_input.is_finite() || req.target_input <= 0.0 {
            return Err(AggrError::Solver(format!("invalid target input {}", req.target_input)));
        }
        let n = req.num_samples.max(1);
        let chunk = req.target_input / n as f64;

        let mut best = vec![f64::NEG_INFINITY; n + 1];
        best[0] = 0.0;
        let mut tables = Vec::with_capacity(req.curves.len());
        let mut choices = Vec::with_capacity(req.curves.len());

        for curve in req.curves {
            let table = if req.vip_only && !curve.is_vip {
                vec![None; n + 1]
            } else {
                curve_table(curve, req.side, n, chunk)
            };
            let mut next = best.clone();
            let mut choice = vec![0usize; n + 1];
            for j in 1..=n {
                for (k, step) in table.iter().enumerate().take(j + 1).skip(1) {
                    let Some(step) = step else { continue };
                    let prev = best[j - k];
                    if !prev.is_finite() {
                        continue;
                    }
                    let v = prev + step.score;
                    if v > next[j] {
                        next[j] = v;
                        choice[j] = k;
                    }
                }
            }
            best = next;
            tables.push(table);
            choices.push(choice);
        }

        let mut j = (0..=n).rev().find(|&j| best[j].is_finite()).unwrap_or(0);
        let mut allocations = vec![Allocation::default(); req.curves.len()];
        for c in (0..req.curves.len()).rev() {
            let k = choices[c][j];
            if k > 0 {
                if let Some(step) = tables[c][k] {
                    allocations[c] = Allocation {
                        input: chunk * k as f64,
                        output: step.output,
                    };
                }
                j -= k;
            }
        }
        Ok(allocations)
    }
}

fn curve_table(curve: &SerializedCurve, side: Side, n: usize, chunk: f64) -> Vec<Option<Step>> {
    let mut table = vec![None; n + 1];
    for (k, slot) in table.iter_mut().enumerate().skip(1) {
        let x = chunk * k as f64;
        let Some((output, fee)) = interpolate(curve, x) else {
            break;
        };
        let score = match side {
            Side::Sell => output - fee,
            Side::Buy => -(output + fee),
        };
        *slot = Some(Step { score, output });
    }
    table
}

/// Linear interpolation from the origin through the sampled points. `None`
/// past the last sample.
fn interpolate(curve: &SerializedCurve, x: f64) -> Option<(f64, f64)> {
    let last = curve.inputs.len().min(curve.outputs.len());
    if last == 0 {
        return None;
    }
    let max_input = curve.inputs[..last].iter().copied().fold(0.0, f64::max);
    if x > max_input * (1.0 + INPUT_TOLERANCE) {
        return None;
    }
    let fee_at = |i: usize| curve.output_fees.get(i).copied().unwrap_or(0.0);
    let i = match curve.inputs[..last].iter().position(|&input| input >= x) {
        Some(i) => i,
        // inside tolerance past the end
        None => return Some((curve.outputs[last - 1], fee_at(last - 1))),
    };
    let (x0, y0) = if i == 0 {
        (0.0, 0.0)
    } else {
        (curve.inputs[i - 1], curve.outputs[i - 1])
    };
    let (x1, y1) = (curve.inputs[i], curve.outputs[i]);
    let y = if x1 > x0 { y0 + (y1 - y0) * (x - x0) / (x1 - x0) } else { y1 };
    if !y.is_finite() {
        return None;
    }
    Some((y, fee_at(i)))
}
