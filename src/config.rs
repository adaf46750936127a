//! Serializable network configuration

use burn::{config::Config, tensor::backend::Backend};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error,
    nn::{architectures, Graph, Model},
};

/// The architectures used across the paper's experiments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    /// Chain
    Mpl,
    /// Catch, Key-to-Door
    CnnSmall,
    /// Pong, Skiing
    CnnLarge,
    /// Recurrent actor-critic
    PolicyNetwork,
}

impl Architecture {
    pub fn graph(self) -> Graph {
        match self {
            Architecture::Mpl => architectures::mpl(),
            Architecture::CnnSmall => architectures::cnn_small(),
            Architecture::CnnLarge => architectures::cnn_large(),
            Architecture::PolicyNetwork => architectures::policy_network(),
        }
    }
}

/// Configuration for a network
///
/// Saved and loaded as JSON through burn's [`Config`] trait.
#[derive(Config, Debug)]
pub struct NetworkConfig {
    /// Which architecture to build
    pub architecture: Architecture,
    /// Per-example input shape, batch dimension excluded
    /// (e.g. `[4]` for vectors, `[3, 10, 10]` for channels-first images)
    pub input_shape: Vec<usize>,
    /// Use the architecture as the feature network of a synthetic-return module
    #[config(default = false)]
    pub synthetic_return: bool,
    /// Seed for parameter initialisation
    #[config(default = 0)]
    pub seed: u64,
}

impl NetworkConfig {
    /// The layer graph this configuration describes
    pub fn graph(&self) -> Graph {
        let graph = self.architecture.graph();
        if self.synthetic_return {
            architectures::synthetic_return(graph)
        } else {
            graph
        }
    }

    /// Initialise the network on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<Model<B>> {
        let model = self
            .graph()
            .init::<B>(self.input_shape.clone(), self.seed, device)?;

        info!(
            architecture = ?self.architecture,
            synthetic_return = self.synthetic_return,
            input = ?self.input_shape,
            output = %model.output_signature(),
            params = model.num_params(),
            "network initialised"
        );

        Ok(model)
    }
}
