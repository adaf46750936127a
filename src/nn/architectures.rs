//! Network architectures from "Synthetic Returns for Long-Term Credit
//! Assignment" (Raposo et al., 2021, <https://arxiv.org/abs/2102.12425>)
//!
//! Each factory returns a fresh [`Graph`]. Nothing is validated here; a
//! feature network whose output does not fit the synthetic-return heads is
//! reported by [`Graph::init`].

use super::graph::{Graph, Padding};

/// MLP used for the Chain experiment
///
/// `[features] → Dense(128) → ReLU`
pub fn mpl() -> Graph {
    Graph::serial([Graph::dense(128), Graph::Relu])
}

/// CNN used for the Catch and Key-to-Door experiments
///
/// Two 2x2 stride-1 convolutions (32 then 64 filters), then a 256-wide
/// dense layer. Expects channels-first `[channels, height, width]` input of
/// at least 3x3.
pub fn cnn_small() -> Graph {
    Graph::serial([
        Graph::conv(32, [2, 2], [1, 1], Padding::Valid),
        Graph::Relu,
        Graph::conv(64, [2, 2], [1, 1], Padding::Valid),
        Graph::Relu,
        Graph::Flatten,
        Graph::dense(256),
        Graph::Relu,
    ])
}

/// CNN used for the Pong and Skiing experiments
///
/// Three 3x3 stride-2 convolutions (32, 64, 64 filters), then a 256-wide
/// dense layer. Needs at least 15x15 input.
pub fn cnn_large() -> Graph {
    Graph::serial([
        Graph::conv(32, [3, 3], [2, 2], Padding::Valid),
        Graph::Relu,
        Graph::conv(64, [3, 3], [2, 2], Padding::Valid),
        Graph::Relu,
        Graph::conv(64, [3, 3], [2, 2], Padding::Valid),
        Graph::Relu,
        Graph::Flatten,
        Graph::dense(256),
        Graph::Relu,
    ])
}

/// Recurrent actor-critic network
///
/// `LSTM(256) → Dense(256) → ReLU → FanOut(2)` into two bare `Dense(1)`
/// heads: policy and value.
pub fn policy_network() -> Graph {
    Graph::serial([
        Graph::lstm(256),
        Graph::dense(256),
        Graph::Relu,
        Graph::fan_out(2),
        Graph::parallel([Graph::dense(1), Graph::dense(1)]),
    ])
}

/// Synthetic-return module over `features_network`
///
/// Features are flattened and fanned out to three independent branches:
/// - gate: `Dense(256) → ReLU → Dense(1) → ReLU → Dense(1) → Sigmoid`
/// - contribution: `Dense(256) → ReLU → Dense(256) → ReLU → Dense(1)`
/// - baseline: same shape as contribution, separate parameters
///
/// See [`SyntheticReturnHeads`](super::SyntheticReturnHeads) for reading the
/// output tuple.
pub fn synthetic_return(features_network: Graph) -> Graph {
    Graph::serial([
        features_network,
        Graph::Flatten,
        Graph::fan_out(3),
        Graph::parallel([gate(), utility(), utility()]),
    ])
}

fn gate() -> Graph {
    Graph::serial([
        Graph::dense(256),
        Graph::Relu,
        Graph::dense(1),
        Graph::Relu,
        Graph::dense(1),
        Graph::Sigmoid,
    ])
}

/// Shared shape of the contribution and baseline branches
fn utility() -> Graph {
    Graph::serial([
        Graph::dense(256),
        Graph::Relu,
        Graph::dense(256),
        Graph::Relu,
        Graph::dense(1),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_two(graph: &Graph) -> (&Graph, &Graph) {
        let stages = graph.children();
        (&stages[stages.len() - 2], &stages[stages.len() - 1])
    }

    #[test]
    fn test_factories_are_idempotent() {
        assert_eq!(mpl(), mpl());
        assert_eq!(cnn_small(), cnn_small());
        assert_eq!(cnn_large(), cnn_large());
        assert_eq!(policy_network(), policy_network());
        assert_eq!(synthetic_return(mpl()), synthetic_return(mpl()));
    }

    #[test]
    fn test_mpl_layout() {
        assert_eq!(mpl().to_string(), "Serial[Dense(128), Relu]");
    }

    #[test]
    fn test_cnns_flatten_before_final_dense() {
        for graph in [cnn_small(), cnn_large()] {
            let stages = graph.children();
            let n = stages.len();
            assert_eq!(stages[n - 3], Graph::Flatten);
            assert_eq!(stages[n - 2], Graph::dense(256));
            assert_eq!(stages[n - 1], Graph::Relu);
        }
    }

    #[test]
    fn test_cnn_small_convolutions() {
        let convs: Vec<_> = cnn_small()
            .children()
            .iter()
            .filter(|stage| matches!(stage, Graph::Conv { .. }))
            .cloned()
            .collect();

        assert_eq!(
            convs,
            vec![
                Graph::conv(32, [2, 2], [1, 1], Padding::Valid),
                Graph::conv(64, [2, 2], [1, 1], Padding::Valid),
            ]
        );
    }

    #[test]
    fn test_cnn_large_convolutions() {
        let filters: Vec<_> = cnn_large()
            .children()
            .iter()
            .filter_map(|stage| match stage {
                Graph::Conv { filters, kernel: [3, 3], stride: [2, 2], padding: Padding::Valid } => {
                    Some(*filters)
                }
                _ => None,
            })
            .collect();

        assert_eq!(filters, vec![32, 64, 64]);
    }

    #[test]
    fn test_policy_network_heads() {
        let graph = policy_network();
        let (fan_out, heads) = last_two(&graph);

        assert_eq!(graph.children()[0], Graph::lstm(256));
        assert_eq!(*fan_out, Graph::fan_out(2));
        assert_eq!(*heads, Graph::parallel([Graph::dense(1), Graph::dense(1)]));
    }

    #[test]
    fn test_synthetic_return_branches() {
        let graph = synthetic_return(cnn_small());
        let stages = graph.children();
        let (fan_out, parallel) = last_two(&graph);

        assert_eq!(stages[0], cnn_small());
        assert_eq!(stages[1], Graph::Flatten);
        assert_eq!(*fan_out, Graph::fan_out(3));

        let branches = parallel.children();
        assert_eq!(branches.len(), 3);

        let gate = branches[0].children();
        assert_eq!(gate[gate.len() - 2], Graph::dense(1));
        assert_eq!(gate[gate.len() - 1], Graph::Sigmoid);

        for utility in &branches[1..] {
            let stages = utility.children();
            assert_eq!(stages.last(), Some(&Graph::dense(1)));
            assert!(!stages.contains(&Graph::Sigmoid));
        }
    }

    #[test]
    fn test_synthetic_return_accepts_any_graph() {
        // Not validated until init
        let graph = synthetic_return(Graph::FanOut(2));

        assert_eq!(graph.children()[0], Graph::FanOut(2));
    }
}
