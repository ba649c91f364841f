use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use walkdir::WalkDir;

use super::{errors::DatasetError, transforms::Pipeline};

pub const IMG_EXTS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "pgm", "tif", "tiff", "webp"];

/// True for regular files whose extension is in [`IMG_EXTS`], ignoring case.
pub fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMG_EXTS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

#[derive(Debug, Clone)]
pub struct ImageItem {
    /// Normalized CHW pixels, `None` when the file could not be decoded.
    pub pixels: Option<Vec<f32>>,
    pub label: usize,
    pub path: PathBuf,
}

/// A labeled image dataset laid out as `root/<class>/**/<image>`.
///
/// Classes are the subdirectories of `root` in alphabetical order; their
/// position in that order is the label.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<(PathBuf, usize)>,
    transform: Pipeline,
}

impl ImageFolder {
    pub fn new<P: AsRef<Path>>(root: P, transform: Pipeline) -> Result<Self, DatasetError> {
        let root = root.as_ref().to_path_buf();

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(&root).map_err(DatasetError::io(&root))? {
            let entry = entry.map_err(DatasetError::io(&root))?;
            if entry.path().is_dir() {
                classes.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        classes.sort();

        let mut samples = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let class_dir = root.join(class);
            for entry in WalkDir::new(&class_dir)
                .follow_links(true)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| {
                    let path = e.path().map_or_else(|| class_dir.clone(), Path::to_path_buf);
                    DatasetError::Io {
                        path,
                        source: e.into(),
                    }
                })?;
                if is_image_file(entry.path()) {
                    samples.push((entry.into_path(), label));
                }
            }
        }

        Ok(Self {
            root,
            classes,
            samples,
            transform,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }

    pub fn transform(&self) -> &Pipeline {
        &self.transform
    }

    /// Number of samples carrying each label.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        for (_, label) in &self.samples {
            counts[*label] += 1;
        }
        counts
    }
}

impl Dataset<ImageItem> for ImageFolder {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let (path, label) = self.samples.get(index)?;
        let pixels = match image::open(path) {
            Ok(img) => Some(self.transform.run(img, &mut rand::thread_rng())),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping undecodable image");
                None
            }
        };
        Some(ImageItem {
            pixels,
            label: *label,
            path: path.clone(),
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs;

    fn write_png(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([10, 200, 30])).save(path).unwrap();
    }

    #[test]
    fn extension_filter_ignores_case() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a.JPG", "b.Png", "c.tiff", "d.txt", "e"] {
            fs::write(tmp.path().join(name), b"").unwrap();
        }
        fs::create_dir(tmp.path().join("dir.jpg")).unwrap();

        let mut hits: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| is_image_file(p))
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        hits.sort();
        assert_eq!(hits, ["a.JPG", "b.Png", "c.tiff"]);
    }

    #[test]
    fn classes_are_alphabetical() {
        let tmp = tempfile::tempdir().unwrap();
        for class in ["redness", "acne", "normal", "dark_spot"] {
            write_png(&tmp.path().join(class).join("0.png"));
        }
        write_png(&tmp.path().join("acne/nested/1.png"));
        fs::write(tmp.path().join("stray.png"), b"").unwrap();

        let ds = ImageFolder::new(tmp.path(), Pipeline::eval(8)).unwrap();
        assert_eq!(ds.classes(), ["acne", "dark_spot", "normal", "redness"]);
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.class_counts(), vec![2, 1, 1, 1]);
    }

    #[test]
    fn get_decodes_and_transforms() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(&tmp.path().join("acne/0.png"));
        fs::write(tmp.path().join("acne/1.png"), b"garbage").unwrap();

        let ds = ImageFolder::new(tmp.path(), Pipeline::eval(6)).unwrap();
        let good = ds.get(0).unwrap();
        assert_eq!(good.label, 0);
        assert_eq!(good.pixels.unwrap().len(), 3 * 6 * 6);

        let bad = ds.get(1).unwrap();
        assert!(bad.pixels.is_none());
        assert!(ds.get(2).is_none());
    }
}
