pub mod builder;
pub mod model_limits;
pub mod sanitizer;

pub use builder::{BuildReport, BuilderConfig, PayloadBuilder};
