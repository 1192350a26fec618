pub mod noise;

pub use noise::{filter_noisiest, score, score_batch};
