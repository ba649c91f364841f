use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::{
    config::Config,
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    prelude::*,
    tensor::TensorData,
};

use super::{
    errors::DatasetError,
    image_folder::{ImageFolder, ImageItem},
    materialize::{list_images, materialize, SplitConfig},
    split::DatasetSplit,
    transforms::Pipeline,
    DEFAULT_CLASSES, IMG_SIZE,
};

#[derive(Config, Debug)]
pub struct LoaderConfig {
    pub data_dir: PathBuf,
    #[config(default = 16)]
    pub batch_size: usize,
    /// `0` loads batches on the calling thread.
    #[config(default = 2)]
    pub num_workers: usize,
    /// Class folders that must be present under both splits.
    #[config(default = "DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect()")]
    pub classes: Vec<String>,
    #[config(default = "IMG_SIZE")]
    pub image_size: u32,
    /// Seed for the per-epoch shuffle of the training loader.
    #[config(default = 42)]
    pub shuffle_seed: u64,
    #[config(default = "SplitConfig::new()")]
    pub split: SplitConfig,
}

#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// `[batch, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// `[batch]`
    pub targets: Tensor<B, 1, Int>,
    pub paths: Vec<PathBuf>,
}

/// Stacks decoded items into a batch, dropping items that failed to decode.
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    width: usize,
    height: usize,
}

impl ImageBatcher {
    pub fn new(pipeline: &Pipeline) -> Self {
        let (width, height) = pipeline.size();
        Self {
            width: width as usize,
            height: height as usize,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let plane = 3 * self.width * self.height;
        let mut pixels = Vec::with_capacity(items.len() * plane);
        let mut labels = Vec::with_capacity(items.len());
        let mut paths = Vec::with_capacity(items.len());
        for item in items {
            let Some(p) = item.pixels else { continue };
            pixels.extend_from_slice(&p);
            labels.push(item.label as i64);
            paths.push(item.path);
        }

        let n = labels.len();
        let images = Tensor::from_data(
            TensorData::new(pixels, [n, 3, self.height, self.width]),
            device,
        );
        let targets = Tensor::from_data(TensorData::new(labels, [n]), device);
        ImageBatch {
            images,
            targets,
            paths,
        }
    }
}

pub struct Loaders<B: Backend> {
    pub train: Arc<dyn DataLoader<B, ImageBatch<B>>>,
    pub val: Arc<dyn DataLoader<B, ImageBatch<B>>>,
    /// Alphabetical folder order, which is the label order of both loaders.
    /// May differ from [`LoaderConfig::classes`].
    pub classes: Vec<String>,
}

/// Fails with [`DatasetError::MissingClassFolders`] unless every class has a
/// folder directly under `root`.
pub fn ensure_classes<P: AsRef<Path>, S: AsRef<str>>(
    root: P,
    classes: &[S],
) -> Result<(), DatasetError> {
    let root = root.as_ref();
    let missing: Vec<String> = classes
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| !root.join(c).is_dir())
        .map(str::to_owned)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DatasetError::MissingClassFolders {
            root: root.to_path_buf(),
            expected: classes.iter().map(|c| c.as_ref().to_owned()).collect(),
            missing,
        })
    }
}

fn ensure_populated<S: AsRef<str>>(data_dir: &Path, classes: &[S]) -> Result<(), DatasetError> {
    let mut empty = Vec::new();
    for split in DatasetSplit::ALL {
        let root = split.root(data_dir);
        for class in classes.iter().map(|c| c.as_ref()) {
            if list_images(&root.join(class))?.is_empty() {
                empty.push(format!("{}/{class}", split.dir_name()));
            }
        }
    }
    if empty.is_empty() {
        Ok(())
    } else {
        Err(DatasetError::EmptyClassFolders {
            root: data_dir.to_path_buf(),
            empty,
        })
    }
}

/// Splits `config.data_dir` if needed and builds the train and validation
/// loaders.
pub fn make_loaders<B: Backend>(
    config: &LoaderConfig,
    device: &B::Device,
) -> Result<Loaders<B>, DatasetError> {
    let data_dir = config.data_dir.as_path();
    materialize(data_dir, &config.classes, &config.split)?;

    let train_root = DatasetSplit::Train.root(data_dir);
    let val_root = DatasetSplit::Val.root(data_dir);
    if !(train_root.is_dir() && val_root.is_dir()) {
        return Err(DatasetError::MissingDataFolders {
            root: data_dir.to_path_buf(),
            train: train_root,
            val: val_root,
            missing: config.classes.clone(),
        });
    }
    ensure_classes(&train_root, &config.classes)?;
    ensure_classes(&val_root, &config.classes)?;
    ensure_populated(data_dir, &config.classes)?;

    let train_tfms = Pipeline::train(config.image_size);
    let val_tfms = Pipeline::eval(config.image_size);
    let train_batcher = ImageBatcher::new(&train_tfms);
    let val_batcher = ImageBatcher::new(&val_tfms);

    let train_ds = ImageFolder::new(&train_root, train_tfms)?;
    let val_ds = ImageFolder::new(&val_root, val_tfms)?;
    let classes = train_ds.classes().to_vec();
    tracing::info!(
        ?classes,
        train = train_ds.len(),
        val = val_ds.len(),
        "detected classes"
    );

    let mut train = DataLoaderBuilder::new(train_batcher)
        .batch_size(config.batch_size)
        .shuffle(config.shuffle_seed)
        .set_device(device.clone());
    let mut val = DataLoaderBuilder::new(val_batcher)
        .batch_size(config.batch_size)
        .set_device(device.clone());
    // Zero workers loads in the calling thread; burn's multi-threaded loader
    // needs at least one.
    if config.num_workers > 0 {
        train = train.num_workers(config.num_workers);
        val = val.num_workers(config.num_workers);
    }
    let train = train.build(train_ds);
    let val = val.build(val_ds);

    Ok(Loaders {
        train,
        val,
        classes,
    })
}
