pub mod rules;

pub use rules::detect;
