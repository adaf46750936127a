//! Initialised networks and the models that wrap them

use burn::{
    module::{Module, ModuleVisitor},
    nn::{conv::Conv2d, Linear, Lstm, LstmState},
    prelude::*,
    tensor::backend::Backend,
};

use super::{
    flow::{Flow, Signature},
    value::Value,
};
use crate::error::{NetworkError, Result};

/// A [`Graph`](super::Graph) with its parameters allocated
///
/// Mirrors the graph node for node. Combinators own their children, so a
/// parallel branch never shares parameters with its siblings.
#[derive(Debug, Clone)]
pub enum Network<B: Backend> {
    Dense(Linear<B>),
    Conv(Conv2d<B>),
    Relu,
    Sigmoid,
    Flatten,
    /// `slot` indexes this layer's state in a [`Carry`]
    Lstm { cell: Lstm<B>, slot: usize },
    Serial(Vec<Network<B>>),
    Parallel(Vec<Network<B>>),
    FanOut(usize),
}

impl<B: Backend> Network<B> {
    /// Total number of trainable scalars
    pub fn num_params(&self) -> usize {
        match self {
            Network::Dense(linear) => linear.num_params(),
            Network::Conv(conv) => conv.num_params(),
            Network::Lstm { cell, .. } => cell.num_params(),
            Network::Serial(children) | Network::Parallel(children) => {
                children.iter().map(Network::num_params).sum()
            }
            Network::Relu | Network::Sigmoid | Network::Flatten | Network::FanOut(_) => 0,
        }
    }

    /// Draw every lazily initialised parameter now
    ///
    /// burn defers parameter initialisation to first use. Forcing it here
    /// keeps all draws inside the seeded section of `Graph::init`.
    pub(crate) fn materialize(&self) {
        match self {
            Network::Dense(linear) => linear.visit(&mut Materialize),
            Network::Conv(conv) => conv.visit(&mut Materialize),
            Network::Lstm { cell, .. } => cell.visit(&mut Materialize),
            Network::Serial(children) | Network::Parallel(children) => {
                children.iter().for_each(Network::materialize)
            }
            Network::Relu | Network::Sigmoid | Network::Flatten | Network::FanOut(_) => {}
        }
    }

    /// Apply the network to `input`, reading and writing LSTM state in `carry`
    ///
    /// On error `carry` may hold the states of layers that ran before the
    /// failing one; [`Model::step`] only commits on success.
    pub fn apply(&self, input: Flow<Value<B>>, carry: &mut Carry<B>) -> Result<Flow<Value<B>>> {
        match self {
            Network::Serial(stages) => stages
                .iter()
                .try_fold(input, |flow, stage| stage.apply(flow, carry)),
            Network::Parallel(branches) => {
                let inputs = input.into_tuple("Parallel", branches.len())?;
                let outputs = branches
                    .iter()
                    .zip(inputs)
                    .map(|(branch, input)| branch.apply(input, carry))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Flow::Tuple(outputs))
            }
            Network::FanOut(n) => Ok(Flow::Tuple(vec![input; *n])),
            Network::Dense(linear) => {
                let output = match input.into_single("Dense")? {
                    Value::Rank2(t) => Value::Rank2(linear.forward(t)),
                    Value::Rank3(t) => Value::Rank3(linear.forward(t)),
                    Value::Rank4(t) => Value::Rank4(linear.forward(t)),
                };
                Ok(Flow::Single(output))
            }
            Network::Conv(conv) => {
                let x = input.into_single("Conv")?.into_rank4("Conv")?;
                Ok(Flow::Single(Value::Rank4(conv.forward(x))))
            }
            Network::Relu => Ok(Flow::Single(input.into_single("Relu")?.relu())),
            Network::Sigmoid => Ok(Flow::Single(input.into_single("Sigmoid")?.sigmoid())),
            Network::Flatten => Ok(Flow::Single(Value::Rank2(
                input.into_single("Flatten")?.flatten(),
            ))),
            Network::Lstm { cell, slot } => {
                let (output, state) = match input.into_single("Lstm")? {
                    // One time step: [batch, features] -> [batch, 1, features]
                    Value::Rank2(t) => {
                        let (output, state) =
                            cell.forward(t.unsqueeze_dim(1), carry.state(*slot));
                        (Value::Rank2(output.squeeze(1)), state)
                    }
                    Value::Rank3(t) => {
                        let (output, state) = cell.forward(t, carry.state(*slot));
                        (Value::Rank3(output), state)
                    }
                    other => {
                        return Err(NetworkError::RankMismatch {
                            layer: "Lstm",
                            expected: "[features] or [seq, features]",
                            shape: other.feature_shape(),
                        })
                    }
                };
                carry.store(*slot, state);
                Ok(Flow::Single(output))
            }
        }
    }
}

/// Visiting a parameter forces its lazy initialiser
struct Materialize;

impl<B: Backend> ModuleVisitor<B> for Materialize {}

/// Recurrent state threaded between calls to [`Model::step`]
///
/// Holds one `(cell, hidden)` pair per LSTM layer. An empty slot starts the
/// layer from zeros.
#[derive(Debug, Clone)]
pub struct Carry<B: Backend> {
    states: Vec<Option<(Tensor<B, 2>, Tensor<B, 2>)>>,
}

impl<B: Backend> Carry<B> {
    /// `slots` empty states, one per LSTM layer
    pub fn new(slots: usize) -> Self {
        Self {
            states: vec![None; slots],
        }
    }

    /// Number of LSTM slots, filled or not
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True for models without LSTM layers
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// True once every layer has stored a state
    pub fn is_primed(&self) -> bool {
        self.states.iter().all(Option::is_some)
    }

    /// Forget all stored states, e.g. at an episode boundary
    pub fn reset(&mut self) {
        self.states.iter_mut().for_each(|state| *state = None);
    }

    /// Batch size of the stored states, if any
    pub fn batch_size(&self) -> Option<usize> {
        self.states
            .iter()
            .flatten()
            .map(|(cell, _)| cell.dims()[0])
            .next()
    }

    /// Hidden state of the LSTM layer in `slot`, `[batch, hidden]`
    pub fn hidden(&self, slot: usize) -> Option<&Tensor<B, 2>> {
        self.states.get(slot)?.as_ref().map(|(_, hidden)| hidden)
    }

    /// Copy of the state in `slot`; the slot keeps it until `store`
    fn state(&self, slot: usize) -> Option<LstmState<B, 2>> {
        self.states
            .get(slot)?
            .clone()
            .map(|(cell, hidden)| LstmState::new(cell, hidden))
    }

    fn store(&mut self, slot: usize, state: LstmState<B, 2>) {
        if slot >= self.states.len() {
            self.states.resize(slot + 1, None);
        }
        self.states[slot] = Some((state.cell, state.hidden));
    }
}

/// An initialised network together with the signature it was built for
#[derive(Debug, Clone)]
pub struct Model<B: Backend> {
    network: Network<B>,
    input: Signature,
    output: Signature,
    recurrent_slots: usize,
}

impl<B: Backend> Model<B> {
    pub(crate) fn new(
        network: Network<B>,
        input: Signature,
        output: Signature,
        recurrent_slots: usize,
    ) -> Self {
        Self {
            network,
            input,
            output,
            recurrent_slots,
        }
    }

    /// The initialised layers
    pub fn network(&self) -> &Network<B> {
        &self.network
    }

    /// Per-example input shapes the model was initialised for
    pub fn input_signature(&self) -> &Signature {
        &self.input
    }

    /// Per-example output shapes, inferred at initialisation
    pub fn output_signature(&self) -> &Signature {
        &self.output
    }

    /// Total number of trainable scalars
    pub fn num_params(&self) -> usize {
        self.network.num_params()
    }

    /// Zeroed recurrent state sized for this model
    pub fn initial_carry(&self) -> Carry<B> {
        Carry::new(self.recurrent_slots)
    }

    /// Apply the model to a batch, starting every LSTM from zeros
    pub fn forward(&self, input: impl Into<Flow<Value<B>>>) -> Result<Flow<Value<B>>> {
        let mut carry = self.initial_carry();
        self.step(input, &mut carry)
    }

    /// Apply the model to a batch, reading and updating `carry`
    pub fn step(
        &self,
        input: impl Into<Flow<Value<B>>>,
        carry: &mut Carry<B>,
    ) -> Result<Flow<Value<B>>> {
        let input = input.into();

        let found = input.signature();
        if found != self.input {
            return Err(NetworkError::InputMismatch {
                expected: self.input.to_string(),
                found: found.to_string(),
            });
        }

        if let Some(carried) = carry.batch_size() {
            for value in input.leaves() {
                if value.batch_size() != carried {
                    return Err(NetworkError::InputMismatch {
                        expected: format!("batch of {carried} (carried state)"),
                        found: format!("batch of {}", value.batch_size()),
                    });
                }
            }
        }

        // Work on a copy so a failing stage leaves `carry` untouched
        let mut next = carry.clone();
        let output = self.network.apply(input, &mut next)?;
        *carry = next;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Graph;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_dense_param_count() {
        let device = NdArrayDevice::default();

        let model = Graph::dense(8).init::<NdArray>(vec![3], 0, &device).unwrap();

        // 3 * 8 weights + 8 biases
        assert_eq!(model.num_params(), 32);
        assert!(model.initial_carry().is_empty());
    }

    #[test]
    fn test_parallel_branches_do_not_share_parameters() {
        let device = NdArrayDevice::default();
        let graph = Graph::serial([
            Graph::fan_out(2),
            Graph::parallel([Graph::dense(4), Graph::dense(4)]),
        ]);

        let model = graph.init::<NdArray>(vec![5], 0, &device).unwrap();

        assert_eq!(model.num_params(), 2 * (5 * 4 + 4));
    }

    #[test]
    fn test_forward_rejects_wrong_feature_shape() {
        let device = NdArrayDevice::default();
        let model = Graph::dense(2).init::<NdArray>(vec![3], 0, &device).unwrap();

        let input = Tensor::<NdArray, 2>::zeros([1, 4], &device);
        let err = model.forward(input).unwrap_err();

        assert_eq!(
            err,
            NetworkError::InputMismatch { expected: "[3]".into(), found: "[4]".into() }
        );
    }

    #[test]
    fn test_fan_out_copies_input() {
        let device = NdArrayDevice::default();
        let model = Graph::fan_out(3).init::<NdArray>(vec![2], 0, &device).unwrap();

        let input = Tensor::<NdArray, 2>::from_floats([[1.0, 2.0]], &device);
        let output = model.forward(input).unwrap();

        assert_eq!(output.arity(), 3);
        for value in output.leaves() {
            assert_eq!(value.to_vec(), vec![1.0, 2.0]);
        }
    }

    #[test]
    fn test_lstm_step_fills_carry() {
        let device = NdArrayDevice::default();
        let model = Graph::lstm(6).init::<NdArray>(vec![4], 0, &device).unwrap();
        let mut carry = model.initial_carry();
        assert_eq!(carry.len(), 1);
        assert!(!carry.is_primed());

        let input = Tensor::<NdArray, 2>::ones([2, 4], &device);
        let output = model.step(input, &mut carry).unwrap();

        assert_eq!(output.as_single("test").unwrap().dims(), vec![2, 6]);
        assert!(carry.is_primed());
        assert_eq!(carry.batch_size(), Some(2));
        assert_eq!(carry.hidden(0).unwrap().dims(), [2, 6]);

        carry.reset();
        assert!(!carry.is_primed());
    }

    #[test]
    fn test_step_rejects_carry_of_other_batch() {
        let device = NdArrayDevice::default();
        let model = Graph::lstm(3).init::<NdArray>(vec![2], 0, &device).unwrap();
        let mut carry = model.initial_carry();

        model.step(Tensor::<NdArray, 2>::ones([2, 2], &device), &mut carry).unwrap();
        let err = model
            .step(Tensor::<NdArray, 2>::ones([5, 2], &device), &mut carry)
            .unwrap_err();

        assert!(matches!(err, NetworkError::InputMismatch { .. }));
    }

    #[test]
    fn test_carried_state_changes_output() {
        let device = NdArrayDevice::default();
        let model = Graph::lstm(4).init::<NdArray>(vec![3], 0, &device).unwrap();
        let input = Tensor::<NdArray, 2>::ones([1, 3], &device);
        let mut carry = model.initial_carry();

        let first = model.step(input.clone(), &mut carry).unwrap();
        let second = model.step(input.clone(), &mut carry).unwrap();
        let fresh = model.forward(input).unwrap();

        let first = first.as_single("test").unwrap().to_vec();
        let second = second.as_single("test").unwrap().to_vec();
        let fresh = fresh.as_single("test").unwrap().to_vec();
        assert_eq!(first, fresh);
        assert_ne!(first, second);
    }

    #[test]
    fn test_failed_step_keeps_carry() {
        let device = NdArrayDevice::default();
        let lstm = Graph::lstm(3).init::<NdArray>(vec![4], 0, &device).unwrap();
        let input = Tensor::<NdArray, 2>::ones([2, 4], &device);
        let mut carry = lstm.initial_carry();
        lstm.step(input.clone(), &mut carry).unwrap();
        let before = carry.hidden(0).unwrap().to_data();

        // The LSTM runs, then Relu fails on the fanned-out tuple
        let broken = Model::new(
            Network::Serial(vec![lstm.network().clone(), Network::FanOut(2), Network::Relu]),
            Flow::Single(vec![4]),
            Flow::Single(vec![3]),
            1,
        );
        let err = broken.step(input, &mut carry).unwrap_err();

        assert_eq!(err, NetworkError::ExpectedSingle { layer: "Relu", arity: 2 });
        assert_eq!(carry.hidden(0).unwrap().to_data(), before);
    }

    #[test]
    fn test_step_checks_batch_of_every_input() {
        let device = NdArrayDevice::default();
        let graph = Graph::parallel([Graph::lstm(3), Graph::dense(2)]);
        let signature = Flow::Tuple(vec![Flow::Single(vec![4]), Flow::Single(vec![4])]);
        let model = graph.init::<NdArray>(signature, 0, &device).unwrap();
        let mut carry = model.initial_carry();

        let batch = |first: usize, second: usize| -> Flow<Value<NdArray>> {
            Flow::Tuple(vec![
                Tensor::<NdArray, 2>::ones([first, 4], &device).into(),
                Tensor::<NdArray, 2>::ones([second, 4], &device).into(),
            ])
        };
        model.step(batch(2, 2), &mut carry).unwrap();
        let err = model.step(batch(2, 5), &mut carry).unwrap_err();

        assert_eq!(
            err,
            NetworkError::InputMismatch {
                expected: "batch of 2 (carried state)".into(),
                found: "batch of 5".into(),
            }
        );
        assert_eq!(carry.batch_size(), Some(2));
    }
}
