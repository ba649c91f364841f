pub mod errors;
pub mod image_folder;
pub mod loaders;
pub mod materialize;
pub mod split;
pub mod transforms;

pub use errors::DatasetError;
pub use image_folder::{ImageFolder, ImageItem, IMG_EXTS};
pub use loaders::{make_loaders, ImageBatch, ImageBatcher, LoaderConfig, Loaders};
pub use materialize::{materialize, Materialized, SplitConfig, SplitReport};
pub use split::DatasetSplit;
pub use transforms::Pipeline;

/// Input resolution of EfficientNet-B3.
pub const IMG_SIZE: u32 = 300;

pub const DEFAULT_CLASSES: [&str; 4] = ["acne", "dark_spot", "redness", "normal"];
