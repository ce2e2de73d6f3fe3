//! Error types shared by every stage of the pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum YorickError {
    /// Invalid hyperparameters or corpus, raised at construction or `fit` entry.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown symbol {0:?}: not in vocabulary")]
    UnknownSymbol(char),

    /// Loss became NaN or infinite. Training is not retried.
    #[error("training diverged at step {step}: loss = {loss}")]
    Divergence { step: usize, loss: f32 },

    #[error("parameters already initialized")]
    AlreadyInitialized,

    #[error("parameters not initialized")]
    NotInitialized,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, YorickError>;

impl YorickError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        YorickError::Config(msg.into())
    }
}
