//! Neural Network Layers
//!
//! The trainable building blocks of the character model. Each layer keeps
//! its parameters as plain [`Tensor`](crate::Tensor)s and hand-codes its
//! backward pass:
//!
//! ```rust,ignore
//! impl TrainableLayer {
//!     pub fn new(...) -> Self { }
//!     pub fn forward(&self, x: &Tensor) -> (Tensor, Cache) { }
//!     pub fn backward(&self, grad: &Tensor, cache: &Cache) -> Gradients { }
//! }
//! ```
//!
//! ## Layers
//!
//! - **embedding**: Symbol index → vector lookup
//! - **dropout**: Training-time dropout on embeddings
//! - **lstm**: One LSTM cell, stepped one position at a time
//! - **linear**: Output projection to vocabulary logits
//! - **init**: Uniform and orthogonal initializers

pub mod dropout;
pub mod embedding;
pub mod init;
pub mod linear;
pub mod lstm;

pub use dropout::{DropoutCache, TrainableDropout};
pub use embedding::TrainableEmbedding;
pub use linear::{LinearCache, LinearGradients, TrainableLinear};
pub use lstm::{LstmCache, LstmGradients, TrainableLstmCell, FORGET_BIAS};
