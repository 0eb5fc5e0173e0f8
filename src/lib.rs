pub mod cli;
pub mod model;
pub mod retention;
pub mod screen;
pub mod state;
pub mod trace;

pub use model::config::{Compatibility, LoadMode, LoaderConfig, ModelConfig};
pub use model::error::ModelError;
pub use model::model::Model;
pub use retention::loader::{LoadOutcome, LoadWarning, load_model, load_model_outcome};
