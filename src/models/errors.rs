use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("No Conv2d layer found for Grad-CAM.")]
    MissingFeatureLayer,

    #[error("num_classes must be at least 1")]
    InvalidClassCount,

    #[error("failed to load pretrained weights from '{}': {reason}", path.display())]
    Weights { path: PathBuf, reason: String },

    #[error("pretrained weights requested, but no weights_path is set and downloading is disabled")]
    WeightsUnavailable,

    #[cfg(feature = "download")]
    #[error(transparent)]
    Download(#[from] crate::download::DownloadError),
}
