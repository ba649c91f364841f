use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    record::{FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use super::{
    efficientnet::{EfficientNet, EfficientNetConfig, EfficientNetRecord},
    errors::ModelError,
};

/// torchvision `EfficientNet_B3_Weights.IMAGENET1K_V1`.
pub const EFFICIENTNET_B3_URL: &str =
    "https://download.pytorch.org/models/efficientnet_b3_rwightman-b3899882.pth";

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 4)]
    pub num_classes: usize,
    #[config(default = true)]
    pub pretrained: bool,
    /// Local PyTorch checkpoint; downloaded to the cache directory when unset.
    pub weights_path: Option<PathBuf>,
    /// Backbone layout. Its `num_classes` is the head width of the
    /// checkpoint (1000 for ImageNet); the returned model has
    /// [`ModelConfig::num_classes`] outputs either way.
    #[config(default = "EfficientNetConfig::b3()")]
    pub architecture: EfficientNetConfig,
}

/// Builds the classifier with a `num_classes`-way output layer, starting from
/// ImageNet weights when `config.pretrained` is set.
pub fn create_model<B: Backend>(
    config: &ModelConfig,
    device: &B::Device,
) -> Result<EfficientNet<B>, ModelError> {
    if config.num_classes == 0 {
        return Err(ModelError::InvalidClassCount);
    }

    if !config.pretrained {
        tracing::info!(num_classes = config.num_classes, "initializing from scratch");
        return Ok(config
            .architecture
            .clone()
            .with_num_classes(config.num_classes)
            .init(device));
    }

    let weights = match &config.weights_path {
        Some(path) => path.clone(),
        None => fetch_weights()?,
    };
    let model = config.architecture.init(device);
    let model = load_torchvision_weights(model, &weights, device)?;
    tracing::info!(
        weights = %weights.display(),
        num_classes = config.num_classes,
        "loaded pretrained backbone"
    );
    Ok(model.with_num_classes(config.num_classes, device))
}

/// Loads a torchvision EfficientNet checkpoint into `model`.
pub fn load_torchvision_weights<B: Backend>(
    model: EfficientNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<EfficientNet<B>, ModelError> {
    if !path.is_file() {
        return Err(ModelError::Weights {
            path: path.to_path_buf(),
            reason: "file not found".to_owned(),
        });
    }
    let mut args = LoadArgs::new(path.to_path_buf());
    for (pattern, replacement) in torchvision_key_remap(&model) {
        args = args.with_key_remap(&pattern, &replacement);
    }
    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
    let record: EfficientNetRecord<B> =
        Recorder::<B>::load(&recorder, args, device).map_err(|e| ModelError::Weights {
            path: path.to_path_buf(),
            reason: format!("{e:?}"),
        })?;
    Ok(model.load_record(record))
}

/// Regex rewrites from torchvision parameter names to this crate's module
/// paths.
///
/// torchvision nests everything under `features.N`: `0` is the stem, the
/// last index is the head, and each block is a flat `block` sequence whose
/// indices shift by one when the block has no expansion conv.
pub(crate) fn torchvision_key_remap<B: Backend>(model: &EfficientNet<B>) -> Vec<(String, String)> {
    let head = model.stages.len() + 1;
    let mut remap = vec![
        (r"^features\.0\.0\.".to_owned(), "stem.conv.".to_owned()),
        (r"^features\.0\.1\.".to_owned(), "stem.norm.".to_owned()),
        (format!(r"^features\.{head}\.0\."), "head.conv.".to_owned()),
        (format!(r"^features\.{head}\.1\."), "head.norm.".to_owned()),
        (r"^classifier\.1\.".to_owned(), "classifier.".to_owned()),
    ];

    for (s, stage) in model.stages.iter().enumerate() {
        let expands = stage.blocks.first().is_some_and(|b| b.expand.is_some());
        let feature = s + 1;
        let offset = usize::from(expands);
        let block = format!(r"^features\.{feature}\.(\d+)\.block\.");
        let target = format!("stages.{s}.blocks.${{1}}.");
        if expands {
            remap.push((format!(r"{block}0\.0\."), format!("{target}expand.conv.")));
            remap.push((format!(r"{block}0\.1\."), format!("{target}expand.norm.")));
        }
        let parts = [
            (offset, "0", "depthwise.conv."),
            (offset, "1", "depthwise.norm."),
            (offset + 2, "0", "project.conv."),
            (offset + 2, "1", "project.norm."),
        ];
        for (idx, sub, to) in parts {
            remap.push((format!(r"{block}{idx}\.{sub}\."), format!("{target}{to}")));
        }
        remap.push((format!(r"{block}{}\.", offset + 1), format!("{target}se.")));
    }
    remap
}

#[cfg(feature = "download")]
fn fetch_weights() -> Result<PathBuf, ModelError> {
    use crate::download::{download_to, hash_prefix_from_url};

    let file = EFFICIENTNET_B3_URL
        .rsplit('/')
        .next()
        .unwrap_or("efficientnet_b3.pth");
    let dir = directories::ProjectDirs::from("", "", "skin-classification")
        .map(|dirs| dirs.cache_dir().join("weights"))
        .unwrap_or_else(|| PathBuf::from(".cache").join("weights"));
    let path = dir.join(file);
    if !path.exists() {
        let hash = hash_prefix_from_url(EFFICIENTNET_B3_URL).unwrap_or_default();
        download_to(&path, EFFICIENTNET_B3_URL, hash)?;
    }
    Ok(path)
}

#[cfg(not(feature = "download"))]
fn fetch_weights() -> Result<PathBuf, ModelError> {
    Err(ModelError::WeightsUnavailable)
}
