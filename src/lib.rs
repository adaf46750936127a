//! Network architectures for synthetic-returns credit assignment
//!
//! Factories in [`nn::architectures`] return declarative [`Graph`]s: a
//! multilayer perceptron, two convolutional feature extractors, a recurrent
//! dual-head policy network and the synthetic-return module of
//! Raposo et al. (2021). A graph holds no parameters until it is initialised
//! for an input shape on a burn backend:
//!
//! ```rust,ignore
//! use burn::backend::ndarray::{NdArray, NdArrayDevice};
//! use sr::nn::{mpl, synthetic_return, SyntheticReturnHeads};
//!
//! let device = NdArrayDevice::default();
//! let model = synthetic_return(mpl()).init::<NdArray>(vec![8], 0, &device)?;
//!
//! let heads = SyntheticReturnHeads::try_from(model.forward(observations)?)?;
//! let sr = heads.synthetic_return(); // gate * contribution + baseline
//! ```

pub mod config;
pub mod error;
pub mod nn;
pub mod traits;

pub use config::{Architecture, NetworkConfig};
pub use error::{NetworkError, Result};
pub use nn::{Graph, Model};
