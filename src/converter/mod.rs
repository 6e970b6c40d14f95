//! Document conversion: the backend boundary, the two backends and the
//! manager that runs them off the UI thread.

mod builtin;
mod engine;
mod manager;
mod markitdown_cli;
mod progress;

pub use engine::{BackendChoice, DefaultConverterFactory};
pub use manager::{ConversionParameters, ConverterManager, ProgressCallback};
pub use progress::ConversionProgress;
