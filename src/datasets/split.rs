use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSplit {
    Train,
    Val,
}

impl DatasetSplit {
    pub const ALL: [DatasetSplit; 2] = [DatasetSplit::Train, DatasetSplit::Val];

    pub fn dir_name(&self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
        }
    }

    pub fn root<P: AsRef<Path>>(&self, data_dir: P) -> PathBuf {
        data_dir.as_ref().join(self.dir_name())
    }
}

/// Number of images out of `total` that go to validation.
///
/// At least one image is always held out, so a class with a single image
/// leaves its training folder empty.
pub fn val_count(total: usize, ratio: f64) -> usize {
    if total > 1 {
        ((total as f64 * ratio) as usize).max(1)
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn val_count_floors_and_keeps_one() {
        assert_eq!(val_count(100, 0.15), 15);
        assert_eq!(val_count(10, 0.15), 1);
        assert_eq!(val_count(2, 0.15), 1);
        assert_eq!(val_count(7, 0.5), 3);
    }

    #[test]
    fn val_count_single_or_empty_class() {
        assert_eq!(val_count(1, 0.15), 1);
        assert_eq!(val_count(0, 0.15), 1);
    }

    #[test]
    fn split_roots() {
        assert_eq!(DatasetSplit::Train.root("data"), PathBuf::from("data/train"));
        assert_eq!(DatasetSplit::Val.root("data"), PathBuf::from("data/val"));
    }
}
