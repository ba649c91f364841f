//! Dataset preparation and model construction for fine-tuning an image
//! classifier on skin-condition photos.
//!
//! - [`datasets::make_loaders`] splits `<root>/<class>/*` into `train/` and
//!   `val/` when needed and returns augmented burn data loaders.
//! - [`models::create_model`] builds EfficientNet-B3 with a head sized to the
//!   class count, optionally starting from ImageNet weights.
//! - [`models::find_last_conv_layer`] locates the Grad-CAM feature layer.

pub mod datasets;
#[cfg(feature = "download")]
pub mod download;
pub mod logging;
pub mod models;
