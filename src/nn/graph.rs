//! Declarative layer graphs
//!
//! A [`Graph`] describes the shape and connectivity of a network without
//! holding any parameters. Building one never fails; every check happens in
//! [`Graph::init`], once the input signature is known.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Linear, LinearConfig, LstmConfig, PaddingConfig2d,
    },
    tensor::backend::Backend,
};
use tracing::debug;

use super::{
    flow::{Flow, Signature},
    network::{Model, Network},
};
use crate::error::{NetworkError, Result};

/// Spatial padding for [`Graph::Conv`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// No padding; the kernel only visits positions where it fits entirely
    Valid,
    /// Zero padding that preserves height and width (stride 1, odd kernels)
    Same,
}

/// A layer graph: primitive layers and the combinators that wire them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Graph {
    /// Fully-connected transform of the last feature dimension
    Dense { units: usize },
    /// 2D convolution over `[channels, height, width]` features
    Conv {
        filters: usize,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding,
    },
    Relu,
    Sigmoid,
    /// Collapse all feature dimensions into one
    Flatten,
    /// LSTM over `[seq, features]` (or a single step of `[features]`)
    Lstm { hidden: usize },
    /// Thread the output of each stage into the next
    Serial(Vec<Graph>),
    /// Apply the i-th branch to the i-th entry of a tuple input
    Parallel(Vec<Graph>),
    /// Replicate the input into a tuple of `n` identical copies
    FanOut(usize),
}

impl Graph {
    pub fn dense(units: usize) -> Self {
        Graph::Dense { units }
    }

    pub fn conv(filters: usize, kernel: [usize; 2], stride: [usize; 2], padding: Padding) -> Self {
        Graph::Conv {
            filters,
            kernel,
            stride,
            padding,
        }
    }

    pub fn lstm(hidden: usize) -> Self {
        Graph::Lstm { hidden }
    }

    pub fn serial(stages: impl IntoIterator<Item = Graph>) -> Self {
        Graph::Serial(stages.into_iter().collect())
    }

    pub fn parallel(branches: impl IntoIterator<Item = Graph>) -> Self {
        Graph::Parallel(branches.into_iter().collect())
    }

    pub fn fan_out(n: usize) -> Self {
        Graph::FanOut(n)
    }

    /// Short layer name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Graph::Dense { .. } => "Dense",
            Graph::Conv { .. } => "Conv",
            Graph::Relu => "Relu",
            Graph::Sigmoid => "Sigmoid",
            Graph::Flatten => "Flatten",
            Graph::Lstm { .. } => "Lstm",
            Graph::Serial(_) => "Serial",
            Graph::Parallel(_) => "Parallel",
            Graph::FanOut(_) => "FanOut",
        }
    }

    /// Child graphs of a combinator, empty for primitive layers
    pub fn children(&self) -> &[Graph] {
        match self {
            Graph::Serial(children) | Graph::Parallel(children) => children,
            _ => &[],
        }
    }

    /// Number of LSTM layers anywhere in the graph
    pub fn recurrent_layers(&self) -> usize {
        match self {
            Graph::Lstm { .. } => 1,
            _ => self.children().iter().map(Graph::recurrent_layers).sum(),
        }
    }

    /// Infer the output signature for `input` without allocating parameters
    pub fn output_signature(&self, input: &Signature) -> Result<Signature> {
        match self.node() {
            Node::Serial(stages) => stages
                .iter()
                .try_fold(input.clone(), |signature, stage| stage.output_signature(&signature)),
            Node::Parallel(branches) => {
                let inputs = input.clone().into_tuple("Parallel", branches.len())?;
                let outputs = branches
                    .iter()
                    .zip(inputs.iter())
                    .map(|(branch, input)| branch.output_signature(input))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Flow::Tuple(outputs))
            }
            Node::FanOut(n) => fan_out_signature(n, input),
            Node::Leaf(leaf) => {
                let shape = input.as_single(leaf.name())?;
                leaf.output_shape(shape).map(Flow::Single)
            }
        }
    }

    /// Allocate parameters for `input` and return the initialised model
    ///
    /// `seed` reseeds the backend's parameter initialiser, and every
    /// parameter is drawn before `init` returns. Reseeding and drawing happen
    /// under a crate-wide lock, so concurrent `init` calls cannot interleave:
    /// the same seed and graph give the same parameters. Code outside this
    /// crate that draws from the same backend RNG at the same time (e.g.
    /// `Tensor::random`) can still shift the draws.
    pub fn init<B: Backend>(
        &self,
        input: impl Into<Signature>,
        seed: u64,
        device: &B::Device,
    ) -> Result<Model<B>> {
        let input = input.into();
        for shape in input.leaves() {
            if shape.is_empty() || shape.len() > 3 {
                return Err(NetworkError::UnsupportedRank(shape.len()));
            }
        }

        let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        B::seed(seed);

        let mut slots = 0;
        let (network, output) = self.build::<B>(&input, &mut slots, device)?;
        network.materialize();

        Ok(Model::new(network, input, output, slots))
    }

    fn build<B: Backend>(
        &self,
        input: &Signature,
        slots: &mut usize,
        device: &B::Device,
    ) -> Result<(Network<B>, Signature)> {
        match self.node() {
            Node::Serial(stages) => {
                let mut signature = input.clone();
                let mut networks = Vec::with_capacity(stages.len());
                for stage in stages {
                    let (network, output) = stage.build::<B>(&signature, slots, device)?;
                    networks.push(network);
                    signature = output;
                }
                Ok((Network::Serial(networks), signature))
            }
            Node::Parallel(branches) => {
                let inputs = input.clone().into_tuple("Parallel", branches.len())?;
                let mut networks = Vec::with_capacity(branches.len());
                let mut outputs = Vec::with_capacity(branches.len());
                for (branch, input) in branches.iter().zip(inputs.iter()) {
                    let (network, output) = branch.build::<B>(input, slots, device)?;
                    networks.push(network);
                    outputs.push(output);
                }
                Ok((Network::Parallel(networks), Flow::Tuple(outputs)))
            }
            Node::FanOut(n) => Ok((Network::FanOut(n), fan_out_signature(n, input)?)),
            Node::Leaf(leaf) => {
                let shape = input.as_single(leaf.name())?;
                let output = leaf.output_shape(shape)?;
                let network = leaf.network::<B>(shape, slots, device);
                debug!(
                    layer = leaf.name(),
                    input = ?shape,
                    output = ?output,
                    params = network.num_params(),
                    "initialised layer"
                );
                Ok((network, Flow::Single(output)))
            }
        }
    }

    fn node(&self) -> Node<'_> {
        match self {
            Graph::Dense { units } => Node::Leaf(Leaf::Dense { units: *units }),
            Graph::Conv {
                filters,
                kernel,
                stride,
                padding,
            } => Node::Leaf(Leaf::Conv {
                filters: *filters,
                kernel: *kernel,
                stride: *stride,
                padding: *padding,
            }),
            Graph::Relu => Node::Leaf(Leaf::Relu),
            Graph::Sigmoid => Node::Leaf(Leaf::Sigmoid),
            Graph::Flatten => Node::Leaf(Leaf::Flatten),
            Graph::Lstm { hidden } => Node::Leaf(Leaf::Lstm { hidden: *hidden }),
            Graph::Serial(stages) => Node::Serial(stages),
            Graph::Parallel(branches) => Node::Parallel(branches),
            Graph::FanOut(n) => Node::FanOut(*n),
        }
    }
}

/// Serialises reseeding and parameter draws across `Graph::init` calls
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// A graph node split into combinators and primitive layers
enum Node<'a> {
    Serial(&'a [Graph]),
    Parallel(&'a [Graph]),
    FanOut(usize),
    Leaf(Leaf),
}

#[derive(Debug, Clone, Copy)]
enum Leaf {
    Dense {
        units: usize,
    },
    Conv {
        filters: usize,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding,
    },
    Relu,
    Sigmoid,
    Flatten,
    Lstm {
        hidden: usize,
    },
}

impl Leaf {
    fn name(&self) -> &'static str {
        match self {
            Leaf::Dense { .. } => "Dense",
            Leaf::Conv { .. } => "Conv",
            Leaf::Relu => "Relu",
            Leaf::Sigmoid => "Sigmoid",
            Leaf::Flatten => "Flatten",
            Leaf::Lstm { .. } => "Lstm",
        }
    }

    fn output_shape(&self, shape: &[usize]) -> Result<Vec<usize>> {
        match *self {
            Leaf::Dense { units } => {
                ensure_positive(self.name(), "units", units)?;
                let mut output = shape.to_vec();
                if let Some(last) = output.last_mut() {
                    *last = units;
                }
                Ok(output)
            }
            Leaf::Conv {
                filters,
                kernel,
                stride,
                padding,
            } => conv_output_shape(filters, kernel, stride, padding, shape),
            Leaf::Relu | Leaf::Sigmoid => Ok(shape.to_vec()),
            Leaf::Flatten => Ok(vec![shape.iter().product()]),
            Leaf::Lstm { hidden } => {
                ensure_positive(self.name(), "hidden", hidden)?;
                match shape {
                    [_] => Ok(vec![hidden]),
                    [seq, _] => Ok(vec![*seq, hidden]),
                    _ => Err(NetworkError::RankMismatch {
                        layer: self.name(),
                        expected: "[features] or [seq, features]",
                        shape: shape.to_vec(),
                    }),
                }
            }
        }
    }

    /// Allocate the module for a layer whose shape was validated
    fn network<B: Backend>(
        &self,
        shape: &[usize],
        slots: &mut usize,
        device: &B::Device,
    ) -> Network<B> {
        let last = shape.last().copied().unwrap_or_default();
        match *self {
            Leaf::Dense { units } => {
                let linear: Linear<B> = LinearConfig::new(last, units).init(device);
                Network::Dense(linear)
            }
            Leaf::Conv {
                filters,
                kernel,
                stride,
                padding,
            } => {
                let padding = match padding {
                    Padding::Valid => PaddingConfig2d::Valid,
                    Padding::Same => PaddingConfig2d::Same,
                };
                let channels = shape.first().copied().unwrap_or_default();
                let conv: Conv2d<B> = Conv2dConfig::new([channels, filters], kernel)
                    .with_stride(stride)
                    .with_padding(padding)
                    .init(device);
                Network::Conv(conv)
            }
            Leaf::Relu => Network::Relu,
            Leaf::Sigmoid => Network::Sigmoid,
            Leaf::Flatten => Network::Flatten,
            Leaf::Lstm { hidden } => {
                let slot = *slots;
                *slots += 1;
                Network::Lstm {
                    cell: LstmConfig::new(last, hidden, true).init(device),
                    slot,
                }
            }
        }
    }
}

fn ensure_positive(layer: &'static str, what: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(NetworkError::InvalidHyperparameter {
            layer,
            reason: format!("{what} must be positive"),
        });
    }
    Ok(())
}

fn fan_out_signature(n: usize, input: &Signature) -> Result<Signature> {
    ensure_positive("FanOut", "branch count", n)?;
    Ok(Flow::Tuple(vec![input.clone(); n]))
}

fn conv_output_shape(
    filters: usize,
    kernel: [usize; 2],
    stride: [usize; 2],
    padding: Padding,
    shape: &[usize],
) -> Result<Vec<usize>> {
    const LAYER: &str = "Conv";

    ensure_positive(LAYER, "filters", filters)?;
    for k in kernel {
        ensure_positive(LAYER, "kernel size", k)?;
    }
    for s in stride {
        ensure_positive(LAYER, "stride", s)?;
    }

    let [_, height, width] = shape else {
        return Err(NetworkError::RankMismatch {
            layer: LAYER,
            expected: "[channels, height, width]",
            shape: shape.to_vec(),
        });
    };

    match padding {
        Padding::Valid => {
            if *height < kernel[0] || *width < kernel[1] {
                return Err(NetworkError::KernelTooLarge {
                    layer: LAYER,
                    kernel,
                    spatial: [*height, *width],
                });
            }
            Ok(vec![
                filters,
                (height - kernel[0]) / stride[0] + 1,
                (width - kernel[1]) / stride[1] + 1,
            ])
        }
        Padding::Same => {
            // burn only derives symmetric padding for odd kernels at stride 1
            if stride != [1, 1] || kernel.iter().any(|k| k % 2 == 0) {
                return Err(NetworkError::InvalidHyperparameter {
                    layer: LAYER,
                    reason: format!(
                        "same padding needs stride 1 and odd kernels, got kernel {kernel:?} stride {stride:?}"
                    ),
                });
            }
            Ok(vec![filters, *height, *width])
        }
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Padding::Valid => write!(f, "valid"),
            Padding::Same => write!(f, "same"),
        }
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, children: &[Graph]) -> fmt::Result {
            write!(f, "{name}[")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, "]")
        }

        match self {
            Graph::Dense { units } => write!(f, "Dense({units})"),
            Graph::Conv {
                filters,
                kernel,
                stride,
                padding,
            } => write!(
                f,
                "Conv({filters}, {}x{}, stride {}x{}, {padding})",
                kernel[0], kernel[1], stride[0], stride[1]
            ),
            Graph::Relu => write!(f, "Relu"),
            Graph::Sigmoid => write!(f, "Sigmoid"),
            Graph::Flatten => write!(f, "Flatten"),
            Graph::Lstm { hidden } => write!(f, "Lstm({hidden})"),
            Graph::Serial(stages) => list(f, "Serial", stages),
            Graph::Parallel(branches) => list(f, "Parallel", branches),
            Graph::FanOut(n) => write!(f, "FanOut({n})"),
        }
    }
}
