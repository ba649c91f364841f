use std::path::PathBuf;

use burn::backend::NdArray;
use clap::Parser;
use skin_classification::{
    logging,
    models::{create_model, find_last_conv_layer, ModelConfig},
};

#[derive(Parser, Debug)]
#[command(name = "feature_layer", about = "Build the classifier and report its Grad-CAM layer")]
struct Args {
    #[arg(long, default_value_t = 4)]
    num_classes: usize,
    /// Start from random weights instead of ImageNet.
    #[arg(long)]
    scratch: bool,
    /// Local torchvision checkpoint to use instead of downloading one.
    #[arg(long)]
    weights: Option<PathBuf>,
}

fn main() {
    logging::init("info");
    let args = Args::parse();

    let config = ModelConfig::new()
        .with_num_classes(args.num_classes)
        .with_pretrained(!args.scratch)
        .with_weights_path(args.weights);

    let device = Default::default();
    let model = match create_model::<NdArray<f32>>(&config, &device) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match find_last_conv_layer(&model) {
        Ok(layer) => {
            let dims = layer.as_conv2d().map(|c| c.weight.val().dims());
            println!("feature layer: {} {:?}", layer.path, dims);
            println!("classifier outputs: {}", model.num_classes());
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
