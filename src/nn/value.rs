//! Batched tensors of runtime-determined rank

use burn::{
    prelude::*,
    tensor::{
        activation::{relu, sigmoid},
        backend::Backend,
    },
};

use super::flow::{Flow, Signature};
use crate::error::{NetworkError, Result};

/// A batched float tensor flowing through a [`Network`](super::Network)
///
/// The first dimension is always the batch:
/// - `Rank2`: `[batch, features]`
/// - `Rank3`: `[batch, seq, features]`
/// - `Rank4`: `[batch, channels, height, width]` (channels-first images)
#[derive(Debug, Clone)]
pub enum Value<B: Backend> {
    Rank2(Tensor<B, 2>),
    Rank3(Tensor<B, 3>),
    Rank4(Tensor<B, 4>),
}

impl<B: Backend> Value<B> {
    /// Full shape including the batch dimension
    pub fn dims(&self) -> Vec<usize> {
        match self {
            Value::Rank2(t) => t.dims().to_vec(),
            Value::Rank3(t) => t.dims().to_vec(),
            Value::Rank4(t) => t.dims().to_vec(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.dims()[0]
    }

    /// Shape of one example (batch dimension dropped)
    pub fn feature_shape(&self) -> Vec<usize> {
        self.dims()[1..].to_vec()
    }

    pub fn relu(self) -> Self {
        match self {
            Value::Rank2(t) => Value::Rank2(relu(t)),
            Value::Rank3(t) => Value::Rank3(relu(t)),
            Value::Rank4(t) => Value::Rank4(relu(t)),
        }
    }

    pub fn sigmoid(self) -> Self {
        match self {
            Value::Rank2(t) => Value::Rank2(sigmoid(t)),
            Value::Rank3(t) => Value::Rank3(sigmoid(t)),
            Value::Rank4(t) => Value::Rank4(sigmoid(t)),
        }
    }

    /// Collapse every non-batch dimension into one: `[batch, prod(features)]`
    pub fn flatten(self) -> Tensor<B, 2> {
        match self {
            Value::Rank2(t) => t,
            Value::Rank3(t) => t.flatten(1, 2),
            Value::Rank4(t) => t.flatten(1, 3),
        }
    }

    /// Fold leading dimensions into the batch, keeping the last one:
    /// `[batch * ..., features]`
    pub fn into_matrix(self) -> Tensor<B, 2> {
        match self {
            Value::Rank2(t) => t,
            Value::Rank3(t) => {
                let [batch, seq, features] = t.dims();
                t.reshape([batch * seq, features])
            }
            Value::Rank4(t) => {
                let [batch, a, b, features] = t.dims();
                t.reshape([batch * a * b, features])
            }
        }
    }

    pub fn into_rank4(self, layer: &'static str) -> Result<Tensor<B, 4>> {
        match self {
            Value::Rank4(t) => Ok(t),
            other => Err(NetworkError::RankMismatch {
                layer,
                expected: "[channels, height, width]",
                shape: other.feature_shape(),
            }),
        }
    }

    /// Host copy of the tensor contents, row-major
    pub fn to_vec(&self) -> Vec<f32> {
        let data = match self {
            Value::Rank2(t) => t.to_data(),
            Value::Rank3(t) => t.to_data(),
            Value::Rank4(t) => t.to_data(),
        };
        data.iter::<f32>().collect()
    }
}

impl<B: Backend> From<Tensor<B, 2>> for Value<B> {
    fn from(tensor: Tensor<B, 2>) -> Self {
        Value::Rank2(tensor)
    }
}

impl<B: Backend> From<Tensor<B, 3>> for Value<B> {
    fn from(tensor: Tensor<B, 3>) -> Self {
        Value::Rank3(tensor)
    }
}

impl<B: Backend> From<Tensor<B, 4>> for Value<B> {
    fn from(tensor: Tensor<B, 4>) -> Self {
        Value::Rank4(tensor)
    }
}

impl<B: Backend> From<Tensor<B, 2>> for Flow<Value<B>> {
    fn from(tensor: Tensor<B, 2>) -> Self {
        Flow::Single(Value::Rank2(tensor))
    }
}

impl<B: Backend> From<Tensor<B, 3>> for Flow<Value<B>> {
    fn from(tensor: Tensor<B, 3>) -> Self {
        Flow::Single(Value::Rank3(tensor))
    }
}

impl<B: Backend> From<Tensor<B, 4>> for Flow<Value<B>> {
    fn from(tensor: Tensor<B, 4>) -> Self {
        Flow::Single(Value::Rank4(tensor))
    }
}

impl<B: Backend> Flow<Value<B>> {
    /// Feature shapes of every tensor, preserving tuple structure
    pub fn signature(&self) -> Signature {
        self.map(Value::feature_shape)
    }
}
