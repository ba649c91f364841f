//! Type-tagged traversal of a network's layers.

use std::fmt;

use burn::{
    nn::{conv::Conv2d, pool::AdaptiveAvgPool2d, BatchNorm, Dropout, Linear},
    tensor::backend::Backend,
};

use super::{
    efficientnet::{ConvNormAct, EfficientNet, MbConv, SqueezeExcitation, Stage},
    errors::ModelError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Conv2d,
    BatchNorm,
    Linear,
    Dropout,
    AdaptiveAvgPool2d,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LayerRef<'a, B: Backend> {
    Conv2d(&'a Conv2d<B>),
    BatchNorm(&'a BatchNorm<B, 2>),
    Linear(&'a Linear<B>),
    Dropout(&'a Dropout),
    AdaptiveAvgPool2d(&'a AdaptiveAvgPool2d),
}

impl<B: Backend> LayerRef<'_, B> {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerRef::Conv2d(_) => LayerKind::Conv2d,
            LayerRef::BatchNorm(_) => LayerKind::BatchNorm,
            LayerRef::Linear(_) => LayerKind::Linear,
            LayerRef::Dropout(_) => LayerKind::Dropout,
            LayerRef::AdaptiveAvgPool2d(_) => LayerKind::AdaptiveAvgPool2d,
        }
    }
}

/// A layer and its dotted path from the root module, e.g. `stages.3.blocks.0.se.fc1`.
#[derive(Debug, Clone)]
pub struct NamedLayer<'a, B: Backend> {
    pub path: String,
    pub layer: LayerRef<'a, B>,
}

impl<'a, B: Backend> NamedLayer<'a, B> {
    pub fn as_conv2d(&self) -> Option<&'a Conv2d<B>> {
        match self.layer {
            LayerRef::Conv2d(conv) => Some(conv),
            _ => None,
        }
    }
}

/// Modules that can list their leaf layers in definition order.
pub trait LayerTree<B: Backend> {
    fn visit_layers<'a>(&'a self, prefix: &str, out: &mut Vec<NamedLayer<'a, B>>);

    fn layers(&self) -> Vec<NamedLayer<'_, B>> {
        let mut out = Vec::new();
        self.visit_layers("", &mut out);
        out
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

macro_rules! leaf_layer {
    ($ty:ty, $variant:ident) => {
        impl<B: Backend> LayerTree<B> for $ty {
            fn visit_layers<'a>(&'a self, prefix: &str, out: &mut Vec<NamedLayer<'a, B>>) {
                out.push(NamedLayer {
                    path: prefix.to_owned(),
                    layer: LayerRef::$variant(self),
                });
            }
        }
    };
}

leaf_layer!(Conv2d<B>, Conv2d);
leaf_layer!(BatchNorm<B, 2>, BatchNorm);
leaf_layer!(Linear<B>, Linear);
leaf_layer!(Dropout, Dropout);
leaf_layer!(AdaptiveAvgPool2d, AdaptiveAvgPool2d);

impl<B: Backend, T: LayerTree<B>> LayerTree<B> for Vec<T> {
    fn visit_layers<'a>(&'a self, prefix: &str, out: &mut Vec<NamedLayer<'a, B>>) {
        for (i, item) in self.iter().enumerate() {
            item.visit_layers(&join(prefix, &i.to_string()), out);
        }
    }
}

impl<B: Backend> LayerTree<B> for ConvNormAct<B> {
    fn visit_layers<'a>(&'a self, prefix: &str, out: &mut Vec<NamedLayer<'a, B>>) {
        self.conv.visit_layers(&join(prefix, "conv"), out);
        self.norm.visit_layers(&join(prefix, "norm"), out);
    }
}

impl<B: Backend> LayerTree<B> for SqueezeExcitation<B> {
    fn visit_layers<'a>(&'a self, prefix: &str, out: &mut Vec<NamedLayer<'a, B>>) {
        self.pool.visit_layers(&join(prefix, "pool"), out);
        self.fc1.visit_layers(&join(prefix, "fc1"), out);
        self.fc2.visit_layers(&join(prefix, "fc2"), out);
    }
}

impl<B: Backend> LayerTree<B> for MbConv<B> {
    fn visit_layers<'a>(&'a self, prefix: &str, out: &mut Vec<NamedLayer<'a, B>>) {
        if let Some(expand) = &self.expand {
            expand.visit_layers(&join(prefix, "expand"), out);
        }
        self.depthwise.visit_layers(&join(prefix, "depthwise"), out);
        self.se.visit_layers(&join(prefix, "se"), out);
        self.project.visit_layers(&join(prefix, "project"), out);
    }
}

impl<B: Backend> LayerTree<B> for Stage<B> {
    fn visit_layers<'a>(&'a self, prefix: &str, out: &mut Vec<NamedLayer<'a, B>>) {
        self.blocks.visit_layers(&join(prefix, "blocks"), out);
    }
}

impl<B: Backend> LayerTree<B> for EfficientNet<B> {
    fn visit_layers<'a>(&'a self, prefix: &str, out: &mut Vec<NamedLayer<'a, B>>) {
        self.stem.visit_layers(&join(prefix, "stem"), out);
        self.stages.visit_layers(&join(prefix, "stages"), out);
        self.head.visit_layers(&join(prefix, "head"), out);
        self.avgpool.visit_layers(&join(prefix, "avgpool"), out);
        self.dropout.visit_layers(&join(prefix, "dropout"), out);
        self.classifier.visit_layers(&join(prefix, "classifier"), out);
    }
}

/// The last `Conv2d` in definition order, the hook point for Grad-CAM.
pub fn find_last_conv_layer<B, M>(model: &M) -> Result<NamedLayer<'_, B>, ModelError>
where
    B: Backend,
    M: LayerTree<B> + ?Sized,
{
    model
        .layers()
        .into_iter()
        .rev()
        .find(|l| l.layer.kind() == LayerKind::Conv2d)
        .ok_or(ModelError::MissingFeatureLayer)
}
