//! Layer graphs, their initialised networks and the paper's architectures

pub mod architectures;
pub mod flow;
pub mod graph;
pub mod heads;
pub mod network;
pub mod value;

pub use architectures::{cnn_large, cnn_small, mpl, policy_network, synthetic_return};
pub use flow::{Flow, Signature};
pub use graph::{Graph, Padding};
pub use heads::{PolicyHeads, SyntheticReturnHeads};
pub use network::{Carry, Model, Network};
pub use value::Value;
