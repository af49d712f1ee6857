pub mod args;
pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod seed;
pub mod session;
pub mod storage;
pub mod train;

pub use args::CliArgs;
pub use config::{Precision, ResolvedConfig};
pub use dataset::FineTuningDataset;
pub use error::{DatasetError, FinetuneError};
pub use session::Session;
pub use train::TrainSummary;
