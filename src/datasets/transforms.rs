//! Pixel-level preprocessing and augmentation.

use image::{imageops::FilterType, DynamicImage, Rgb, RgbImage};
use rand::{seq::SliceRandom, Rng};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorJitter {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    /// Max hue shift as a fraction of the color wheel, at most 0.5.
    pub hue: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Resize { width: u32, height: u32 },
    RandomHorizontalFlip { p: f64 },
    ColorJitter(ColorJitter),
}

impl Transform {
    pub fn apply<R: Rng + ?Sized>(&self, img: RgbImage, rng: &mut R) -> RgbImage {
        match *self {
            Transform::Resize { width, height } => {
                if img.dimensions() == (width, height) {
                    img
                } else {
                    image::imageops::resize(&img, width, height, FilterType::Triangle)
                }
            }
            Transform::RandomHorizontalFlip { p } => {
                if rng.gen_bool(p) {
                    image::imageops::flip_horizontal(&img)
                } else {
                    img
                }
            }
            Transform::ColorJitter(jitter) => jitter.apply(img, rng),
        }
    }
}

impl ColorJitter {
    fn apply<R: Rng + ?Sized>(&self, mut img: RgbImage, rng: &mut R) -> RgbImage {
        let mut order = [0u8, 1, 2, 3];
        order.shuffle(rng);
        for op in order {
            match op {
                0 if self.brightness > 0.0 => {
                    let f = factor(rng, self.brightness);
                    map_pixels(&mut img, |p| p.map(|c| c * f));
                }
                1 if self.contrast > 0.0 => {
                    let f = factor(rng, self.contrast);
                    let mean = mean_luma(&img);
                    map_pixels(&mut img, |p| p.map(|c| f * c + (1.0 - f) * mean));
                }
                2 if self.saturation > 0.0 => {
                    let f = factor(rng, self.saturation);
                    map_pixels(&mut img, |p| {
                        let gray = luma(p);
                        p.map(|c| f * c + (1.0 - f) * gray)
                    });
                }
                3 if self.hue > 0.0 => {
                    let shift = rng.gen_range(-self.hue..=self.hue);
                    map_pixels(&mut img, |p| shift_hue(p, shift));
                }
                _ => {}
            }
        }
        img
    }
}

fn factor<R: Rng + ?Sized>(rng: &mut R, amount: f32) -> f32 {
    rng.gen_range((1.0 - amount).max(0.0)..=1.0 + amount)
}

fn map_pixels(img: &mut RgbImage, f: impl Fn([f32; 3]) -> [f32; 3]) {
    for px in img.pixels_mut() {
        let out = f(px.0.map(|c| c as f32));
        *px = Rgb(out.map(|c| c.round().clamp(0.0, 255.0) as u8));
    }
}

fn luma([r, g, b]: [f32; 3]) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

fn mean_luma(img: &RgbImage) -> f32 {
    let n = (img.width() * img.height()).max(1) as f32;
    img.pixels().map(|p| luma(p.0.map(|c| c as f32))).sum::<f32>() / n
}

fn shift_hue(rgb: [f32; 3], shift: f32) -> [f32; 3] {
    let [r, g, b] = rgb.map(|c| c / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return rgb;
    }
    let sector = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    let s = delta / max;
    let h = (sector / 6.0 + shift).rem_euclid(1.0) * 6.0;

    let i = h.floor();
    let f = h - i;
    let p = max * (1.0 - s);
    let q = max * (1.0 - s * f);
    let t = max * (1.0 - s * (1.0 - f));
    let out = match i as u8 % 6 {
        0 => [max, t, p],
        1 => [q, max, p],
        2 => [p, max, t],
        3 => [p, q, max],
        4 => [t, p, max],
        _ => [max, p, q],
    };
    out.map(|c| c * 255.0)
}

/// An ordered list of transforms followed by to-tensor and normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    steps: Vec<Transform>,
    mean: [f32; 3],
    std: [f32; 3],
    size: (u32, u32),
}

impl Pipeline {
    /// Resize, random flip, color jitter, normalize.
    pub fn train(size: u32) -> Self {
        Self {
            steps: vec![
                Transform::Resize {
                    width: size,
                    height: size,
                },
                Transform::RandomHorizontalFlip { p: 0.5 },
                Transform::ColorJitter(ColorJitter {
                    brightness: 0.2,
                    contrast: 0.2,
                    saturation: 0.2,
                    hue: 0.1,
                }),
            ],
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            size: (size, size),
        }
    }

    /// Resize and normalize only.
    pub fn eval(size: u32) -> Self {
        Self {
            steps: vec![Transform::Resize {
                width: size,
                height: size,
            }],
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            size: (size, size),
        }
    }

    pub fn steps(&self) -> &[Transform] {
        &self.steps
    }

    /// Output `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Runs every step and returns a normalized CHW buffer.
    pub fn run<R: Rng + ?Sized>(&self, img: DynamicImage, rng: &mut R) -> Vec<f32> {
        let mut img = img.to_rgb8();
        for step in &self.steps {
            img = step.apply(img, rng);
        }
        self.to_tensor(&img)
    }

    pub fn to_tensor(&self, img: &RgbImage) -> Vec<f32> {
        let (w, h) = img.dimensions();
        let plane = (w * h) as usize;
        let mut out = vec![0.0f32; 3 * plane];
        for (x, y, px) in img.enumerate_pixels() {
            let i = (y * w + x) as usize;
            for c in 0..3 {
                out[c * plane + i] = (px[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }
        out
    }
}
