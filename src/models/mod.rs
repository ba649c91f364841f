pub mod efficientnet;
pub mod errors;
pub mod factory;
pub mod layers;

pub use efficientnet::{EfficientNet, EfficientNetConfig};
pub use errors::ModelError;
pub use factory::{create_model, load_torchvision_weights, ModelConfig};
pub use layers::{find_last_conv_layer, LayerKind, LayerRef, LayerTree, NamedLayer};
