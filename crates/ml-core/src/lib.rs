//! Object detection building blocks shared by the server.
//!
//! The [`DetectionModel`] trait is the only thing the frame pipeline depends
//! on. The TorchScript implementation lives behind the `with-tch` feature so
//! the rest of the workspace builds without libtorch.

pub mod labels;
pub mod loader;
pub mod model;
pub mod postprocess;

#[cfg(feature = "with-tch")]
pub mod detector;

pub use labels::ClassNames;
pub use loader::{LoadedModel, ModelLoadError, load_with_fallback};
pub use model::{Detection, DetectionModel};
pub use postprocess::DecodeParams;

#[cfg(feature = "with-tch")]
pub use tch;
