pub mod pair_softmax;

pub use pair_softmax::{
    pair_softmax, pair_softmax_backward, AnomalyPolicy, AnomalyReport, PairSoftmax,
    PairSoftmaxConfig,
};
