pub mod attention;
pub mod checkpoint;
pub mod compile;
pub mod config;
pub mod error;
pub mod layer_norm;
pub mod model;
pub mod rotary;

pub use compile::{CompiledModel, ExecutableModel};
pub use config::GopilotConfig;
pub use error::{ModelError, ShapeMismatch};
pub use model::GopilotModel;
