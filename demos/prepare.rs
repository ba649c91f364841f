use std::path::PathBuf;

use burn::backend::NdArray;
use clap::Parser;
use skin_classification::{
    datasets::{make_loaders, LoaderConfig, SplitConfig},
    logging,
};

#[derive(Parser, Debug)]
#[command(name = "prepare", about = "Split a class-folder dataset and load one batch")]
struct Args {
    /// Dataset root holding `train/` + `val/` or one folder per class.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    #[arg(long, default_value_t = 16)]
    batch_size: usize,
    /// Fraction of each class held out for validation.
    #[arg(long, default_value_t = 0.15)]
    val_ratio: f64,
    /// Seed for a reproducible split.
    #[arg(long)]
    seed: Option<u64>,
    /// Class folder names, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "acne,dark_spot,redness,normal")]
    classes: Vec<String>,
}

fn main() {
    logging::init("info");
    let args = Args::parse();

    let config = LoaderConfig::new(args.data_dir)
        .with_batch_size(args.batch_size)
        .with_classes(args.classes)
        .with_split(
            SplitConfig::new()
                .with_val_ratio(args.val_ratio)
                .with_seed(args.seed),
        );

    let device = Default::default();
    let loaders = match make_loaders::<NdArray<f32>>(&config, &device) {
        Ok(loaders) => loaders,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    println!("Detected classes: {:?}", loaders.classes);
    println!(
        "train items: {}, val items: {}",
        loaders.train.num_items(),
        loaders.val.num_items()
    );
    if let Some(batch) = loaders.train.iter().next() {
        println!(
            "first train batch: images {:?}, targets {:?}",
            batch.images.dims(),
            batch.targets.dims()
        );
    };
}
