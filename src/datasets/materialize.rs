//! One-time creation of a `train/` + `val/` split from a flat `<root>/<class>/*`
//! layout.

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::config::Config;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::{
    errors::DatasetError,
    image_folder::is_image_file,
    split::{val_count, DatasetSplit},
};

#[derive(Config, Debug)]
pub struct SplitConfig {
    /// Fraction of each class copied into `val/`.
    #[config(default = 0.15)]
    pub val_ratio: f64,
    /// Fixes the shuffle; `None` draws a fresh seed.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// `train/` and `val/` already held images, nothing was touched.
    AlreadySplit,
    Split(SplitReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub classes: Vec<ClassSplit>,
}

impl SplitReport {
    /// `"<split>/<class>"` for every destination folder left without images.
    pub fn empty_folders(&self) -> Vec<String> {
        self.classes
            .iter()
            .flat_map(|c| {
                c.empty
                    .iter()
                    .map(move |split| format!("{}/{}", split.dir_name(), c.class))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSplit {
    pub class: String,
    pub train: usize,
    pub val: usize,
    /// Destinations that already existed and were left alone.
    pub skipped: usize,
    /// Splits whose `<class>` folder still holds no image afterwards.
    pub empty: Vec<DatasetSplit>,
}

/// Makes sure `data_dir` has a populated `train/` and `val/` split.
///
/// An existing split is left untouched. Otherwise every class in `classes`
/// must have a folder directly under `data_dir`; its images are shuffled and
/// copied (never moved) into `train/<class>` and `val/<class>`.
///
/// A class with fewer than two images cannot fill both folders. That is not
/// an error here: the empty folders are listed in [`ClassSplit::empty`] and
/// logged, and [`make_loaders`](super::make_loaders) refuses them.
pub fn materialize<P: AsRef<Path>, S: AsRef<str>>(
    data_dir: P,
    classes: &[S],
    config: &SplitConfig,
) -> Result<Materialized, DatasetError> {
    if !(config.val_ratio > 0.0 && config.val_ratio < 1.0) {
        return Err(DatasetError::InvalidSplitRatio(config.val_ratio));
    }

    let root = data_dir.as_ref();
    let train_root = DatasetSplit::Train.root(root);
    let val_root = DatasetSplit::Val.root(root);

    if has_images(&train_root)? && has_images(&val_root)? {
        tracing::debug!(root = %root.display(), "train/val split already present");
        return Ok(Materialized::AlreadySplit);
    }

    let missing: Vec<String> = classes
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| !root.join(c).is_dir())
        .map(str::to_owned)
        .collect();
    if !missing.is_empty() {
        return Err(DatasetError::MissingDataFolders {
            root: root.to_path_buf(),
            train: train_root,
            val: val_root,
            missing,
        });
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut report = SplitReport::default();
    for class in classes.iter().map(|c| c.as_ref()) {
        let src = root.join(class);
        let dst_train = train_root.join(class);
        let dst_val = val_root.join(class);
        fs::create_dir_all(&dst_train).map_err(DatasetError::io(&dst_train))?;
        fs::create_dir_all(&dst_val).map_err(DatasetError::io(&dst_val))?;

        let mut images = list_images(&src)?;
        images.shuffle(&mut rng);
        let k = val_count(images.len(), config.val_ratio);

        let mut split = ClassSplit {
            class: class.to_owned(),
            train: 0,
            val: 0,
            skipped: 0,
            empty: Vec::new(),
        };
        for (i, name) in images.iter().enumerate() {
            let to_val = i < k;
            let dst = if to_val { &dst_val } else { &dst_train }.join(name);
            if dst.exists() {
                split.skipped += 1;
                continue;
            }
            let src_file = src.join(name);
            fs::copy(&src_file, &dst).map_err(DatasetError::io(&src_file))?;
            tracing::debug!(from = %src_file.display(), to = %dst.display(), "copied");
            if to_val {
                split.val += 1;
            } else {
                split.train += 1;
            }
        }

        for (kind, dir) in DatasetSplit::ALL.into_iter().zip([&dst_train, &dst_val]) {
            if list_images(dir)?.is_empty() {
                tracing::warn!(class, split = kind.dir_name(), "class folder left empty");
                split.empty.push(kind);
            }
        }

        tracing::info!(
            class,
            train = split.train,
            val = split.val,
            skipped = split.skipped,
            "split class folder"
        );
        report.classes.push(split);
    }

    Ok(Materialized::Split(report))
}

/// True when some direct subfolder of `folder` holds at least one image.
fn has_images(folder: &Path) -> Result<bool, DatasetError> {
    if !folder.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(folder).map_err(DatasetError::io(folder))? {
        let entry = entry.map_err(DatasetError::io(folder))?;
        let path = entry.path();
        if path.is_dir() && !list_images(&path)?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Sorted file names of the images directly inside `dir`.
pub(crate) fn list_images(dir: &Path) -> Result<Vec<String>, DatasetError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(DatasetError::io(dir))? {
        let entry = entry.map_err(DatasetError::io(dir))?;
        let path: PathBuf = entry.path();
        if is_image_file(&path) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSES: [&str; 2] = ["acne", "normal"];

    fn touch(dir: &Path, names: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        for n in names {
            fs::write(dir.join(n), b"not really an image").unwrap();
        }
    }

    fn count(dir: &Path) -> usize {
        list_images(dir).unwrap().len()
    }

    #[test]
    fn splits_flat_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("acne"), &["a.jpg", "b.PNG", "c.jpeg", "d.webp", "notes.txt"]);
        touch(&root.join("normal"), &["x.bmp", "y.tif"]);

        let config = SplitConfig::new().with_seed(Some(7));
        let report = match materialize(root, &CLASSES, &config).unwrap() {
            Materialized::Split(report) => report,
            other => panic!("expected a split, got {other:?}"),
        };

        assert_eq!(report.classes.len(), 2);
        assert_eq!(count(&root.join("val/acne")), 1);
        assert_eq!(count(&root.join("train/acne")), 3);
        assert_eq!(count(&root.join("val/normal")), 1);
        assert_eq!(count(&root.join("train/normal")), 1);
        assert!(!root.join("train/acne/notes.txt").exists());
        // originals are copied, not moved
        assert_eq!(count(&root.join("acne")), 4);
    }

    #[test]
    fn second_run_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("acne"), &["a.jpg", "b.jpg", "c.jpg"]);
        touch(&root.join("normal"), &["x.jpg", "y.jpg"]);

        let config = SplitConfig::new().with_seed(Some(1));
        materialize(root, &CLASSES, &config).unwrap();
        let before = (count(&root.join("train/acne")), count(&root.join("val/acne")));

        let again = materialize(root, &CLASSES, &config).unwrap();
        assert_eq!(again, Materialized::AlreadySplit);
        assert_eq!(
            (count(&root.join("train/acne")), count(&root.join("val/acne"))),
            before
        );
    }

    #[test]
    fn existing_destinations_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("acne"), &["a.jpg", "b.jpg"]);
        touch(&root.join("normal"), &["x.jpg", "y.jpg"]);
        // train/ holds images but val/ does not, so the split is redone
        touch(&root.join("train/acne"), &["a.jpg", "b.jpg"]);

        let config = SplitConfig::new().with_seed(Some(3));
        let Materialized::Split(report) = materialize(root, &CLASSES, &config).unwrap() else {
            panic!("expected a split");
        };
        let acne = &report.classes[0];
        assert_eq!(acne.skipped, 1);
        assert_eq!(acne.val, 1);
        assert_eq!(fs::read(root.join("train/acne/a.jpg")).unwrap(), b"not really an image");
    }

    #[test]
    fn sparse_classes_report_empty_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("acne"), &["only.jpg"]);
        touch(&root.join("normal"), &["readme.txt"]);

        let config = SplitConfig::new().with_seed(Some(9));
        let Materialized::Split(report) = materialize(root, &CLASSES, &config).unwrap() else {
            panic!("expected a split");
        };
        assert_eq!(report.classes[0].empty, [DatasetSplit::Train]);
        assert_eq!(report.classes[1].empty, DatasetSplit::ALL);
        assert_eq!(report.empty_folders(), ["train/acne", "train/normal", "val/normal"]);
        assert_eq!(count(&root.join("val/acne")), 1);
    }

    #[test]
    fn full_classes_report_no_empty_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("acne"), &["a.jpg", "b.jpg"]);
        touch(&root.join("normal"), &["x.jpg", "y.jpg", "z.jpg"]);

        let Materialized::Split(report) =
            materialize(root, &CLASSES, &SplitConfig::new()).unwrap()
        else {
            panic!("expected a split");
        };
        assert!(report.empty_folders().is_empty());
    }

    #[test]
    fn missing_flat_folders_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("acne"), &["a.jpg"]);

        let err = materialize(root, &CLASSES, &SplitConfig::new()).unwrap_err();
        match err {
            DatasetError::MissingDataFolders { missing, .. } => {
                assert_eq!(missing, vec!["normal".to_string()])
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(!root.join("train").exists());
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let tmp = tempfile::tempdir().unwrap();
        for ratio in [0.0, 1.0, -0.5, 2.0] {
            let config = SplitConfig::new().with_val_ratio(ratio);
            assert!(matches!(
                materialize(tmp.path(), &CLASSES, &config),
                Err(DatasetError::InvalidSplitRatio(_))
            ));
        }
    }

    #[test]
    fn seeded_split_is_reproducible() {
        let names = ["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg", "f.jpg", "g.jpg"];
        let mut picked = Vec::new();
        for _ in 0..2 {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path();
            touch(&root.join("acne"), &names);
            touch(&root.join("normal"), &names);
            let config = SplitConfig::new().with_val_ratio(0.3).with_seed(Some(42));
            materialize(root, &CLASSES, &config).unwrap();
            picked.push(list_images(&root.join("val/acne")).unwrap());
        }
        assert_eq!(picked[0].len(), 2);
        assert_eq!(picked[0], picked[1]);
    }
}
