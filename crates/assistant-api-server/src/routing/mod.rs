pub mod classifier;

pub use classifier::{Classification, MessageClassifier, RouteDecision};
