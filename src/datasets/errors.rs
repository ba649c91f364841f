use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Expected class folders in '{}': {expected:?}\nMissing: {missing:?}", root.display())]
    MissingClassFolders {
        root: PathBuf,
        expected: Vec<String>,
        missing: Vec<String>,
    },

    #[error(
        "Couldn't find data folders.\nLooked for:\n  {}\n  {}\nMissing class folders in '{}': {missing:?}\n\
         Fix: create train/ and val/ with class subfolders, or place <root>/<class> folders to split automatically.",
        train.display(),
        val.display(),
        root.display()
    )]
    MissingDataFolders {
        root: PathBuf,
        train: PathBuf,
        val: PathBuf,
        missing: Vec<String>,
    },

    #[error("Class folders in '{}' contain no images: {empty:?}", root.display())]
    EmptyClassFolders { root: PathBuf, empty: Vec<String> },

    #[error("split ratio must be in (0, 1), got {0}")]
    InvalidSplitRatio(f64),

    #[error("io error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
