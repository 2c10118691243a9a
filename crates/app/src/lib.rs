//! Real-time object-detection video server.
//!
//! See [`vision`] for the pipeline and HTTP surface.

pub mod html;
pub mod vision;
