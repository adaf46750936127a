//! Typed views over the tuple outputs of the composite architectures

use burn::{prelude::*, tensor::backend::Backend};

use super::{flow::Flow, value::Value};
use crate::error::{NetworkError, Result};

/// The three branches of a synthetic-return module, each `[batch, 1]`
///
/// Sequence inputs are folded into the batch, so a `[batch, seq, 1]` branch
/// becomes `[batch * seq, 1]`.
#[derive(Debug, Clone)]
pub struct SyntheticReturnHeads<B: Backend> {
    /// Sigmoid gate in (0, 1)
    pub gate: Tensor<B, 2>,
    /// State utility contribution
    pub contribution: Tensor<B, 2>,
    /// State utility baseline
    pub baseline: Tensor<B, 2>,
}

impl<B: Backend> SyntheticReturnHeads<B> {
    /// Synthetic return: `gate * contribution + baseline`
    pub fn synthetic_return(&self) -> Tensor<B, 2> {
        self.gate.clone() * self.contribution.clone() + self.baseline.clone()
    }
}

impl<B: Backend> TryFrom<Flow<Value<B>>> for SyntheticReturnHeads<B> {
    type Error = NetworkError;

    fn try_from(output: Flow<Value<B>>) -> Result<Self> {
        let [gate, contribution, baseline] = split::<B, 3>(output, "SyntheticReturn")?;
        Ok(Self {
            gate,
            contribution,
            baseline,
        })
    }
}

/// Dual-head policy output: policy logits and value estimate
#[derive(Debug, Clone)]
pub struct PolicyHeads<B: Backend> {
    pub policy: Tensor<B, 2>,
    pub value: Tensor<B, 2>,
}

impl<B: Backend> TryFrom<Flow<Value<B>>> for PolicyHeads<B> {
    type Error = NetworkError;

    fn try_from(output: Flow<Value<B>>) -> Result<Self> {
        let [policy, value] = split::<B, 2>(output, "PolicyNetwork")?;
        Ok(Self { policy, value })
    }
}

fn split<B: Backend, const N: usize>(
    output: Flow<Value<B>>,
    layer: &'static str,
) -> Result<[Tensor<B, 2>; N]> {
    let branches = output
        .into_tuple(layer, N)?
        .into_iter()
        .map(|branch| branch.into_single(layer).map(Value::into_matrix))
        .collect::<Result<Vec<_>>>()?;

    branches
        .try_into()
        .map_err(|branches: Vec<_>| NetworkError::ArityMismatch {
            layer,
            expected: N,
            found: branches.len(),
        })
}
