pub mod diagnostics;
pub mod error;
pub mod token_estimator;

pub use diagnostics::Diagnostics;
