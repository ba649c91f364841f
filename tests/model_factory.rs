use burn::{backend::NdArray, tensor::Tensor};
use skin_classification::models::{
    create_model, find_last_conv_layer, EfficientNetConfig, LayerKind, LayerTree, ModelConfig,
};

type TestBackend = NdArray<f32>;

#[test]
fn b3_from_scratch_outputs_one_logit_per_class() {
    let device = Default::default();
    let config = ModelConfig::new().with_pretrained(false).with_num_classes(4);
    let model = create_model::<TestBackend>(&config, &device).unwrap();

    let logits = model.forward(Tensor::zeros([1, 3, 32, 32], &device));
    assert_eq!(logits.dims(), [1, 4]);
}

#[test]
fn feature_layer_feeds_the_head() {
    let device = Default::default();
    let config = ModelConfig::new()
        .with_pretrained(false)
        .with_num_classes(3)
        .with_architecture(EfficientNetConfig::new().with_width_mult(0.5).with_depth_mult(0.5));
    let model = create_model::<TestBackend>(&config, &device).unwrap();

    let layer = find_last_conv_layer(&model).unwrap();
    assert_eq!(layer.path, "head.conv");
    let channels = layer.as_conv2d().unwrap().weight.val().dims()[0];

    let images = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
    let features = model.forward_features(images);
    assert_eq!(features.dims()[1], channels);
    assert_eq!(model.forward_head(features).dims(), [2, 3]);

    let convs = model
        .layers()
        .iter()
        .filter(|l| l.layer.kind() == LayerKind::Conv2d)
        .count();
    assert!(convs > 1);
}

fn all_equal<const D: usize>(tensor: Tensor<TestBackend, D>, expected: f32) -> bool {
    tensor
        .into_data()
        .to_vec::<f32>()
        .unwrap()
        .iter()
        .all(|v| (v - expected).abs() < 1e-6)
}

/// `tests/fixtures/tiny_efficientnet.pth` is written by the script next to it.
#[test]
fn pretrained_checkpoint_loads_then_head_is_replaced() {
    let device = Default::default();
    let weights = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/tiny_efficientnet.pth");
    let config = ModelConfig::new()
        .with_num_classes(3)
        .with_weights_path(Some(weights))
        .with_architecture(
            EfficientNetConfig::new()
                .with_width_mult(0.1)
                .with_depth_mult(0.3)
                .with_num_classes(10),
        );
    let model = create_model::<TestBackend>(&config, &device).unwrap();

    assert!(all_equal(model.stem.conv.weight.val(), 0.25));
    assert!(all_equal(model.stem.norm.gamma.val(), 1.0));
    assert!(all_equal(model.stem.norm.running_var.value(), 1.0));
    assert!(all_equal(model.head.conv.weight.val(), 0.125));
    let late = &model.stages[5].blocks[1];
    assert!(all_equal(late.se.fc1.bias.as_ref().unwrap().val(), 0.01));
    assert!(all_equal(late.project.conv.weight.val(), 0.01));

    assert_eq!(model.num_features(), 128);
    assert_eq!(model.num_classes(), 3);
    assert!(!all_equal(model.classifier.weight.val(), 0.5));
    let logits = model.forward(Tensor::zeros([1, 3, 32, 32], &device));
    assert_eq!(logits.dims(), [1, 3]);
}
