//! ONNX Runtime implementations of the network seams.
//!
//! Expected graph signatures (single input, first output is used):
//!
//! | Network     | Input                                  | Output                              |
//! |-------------|----------------------------------------|-------------------------------------|
//! | restorer    | `[1, 3, 512, 512]` RGB in `[-1, 1]`    | `[1, 3, 512, 512]` RGB in `[-1, 1]` |
//! | upsampler   | `[1, 3, h, w]` RGB in `[0, 1]`         | `[1, 3, h*s, w*s]` RGB in `[0, 1]`  |
//! | detector    | `[1, 3, h, w]` BGR minus `(104, 117, 123)` | `[n, 15]` box, score, 5 landmarks |

use super::device::{Device, ExecutionTarget};
use super::network::{DetectedFace, FaceDetector, Network, NetworkLoader};
use crate::constants::face::DETECTION_INPUT_SIZE;
use crate::error::{Error, Result};
use crate::registry::{DetectorSpec, ModelSpec, UpsamplerSpec};
use image::imageops::{self, FilterType};
use image::{Rgb, Rgb32FImage, RgbImage};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use std::path::Path;
use tracing::info;

/// Mean subtracted from BGR detector input.
const DETECTOR_MEAN_BGR: [f32; 3] = [104.0, 117.0, 123.0];

/// Loads ONNX graphs into ONNX Runtime sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader {
    intra_threads: Option<usize>,
}

impl OnnxLoader {
    /// Create a loader using ONNX Runtime's default thread pool size.
    pub const fn new() -> Self {
        Self {
            intra_threads: None,
        }
    }

    /// Limit intra-op threads per session.
    #[must_use]
    pub const fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }

    fn session(&self, weights: &Path, target: ExecutionTarget) -> Result<Session> {
        let model = weights.display().to_string();

        let mut builder = Session::builder()
            .map_err(init_err(&model))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(init_err(&model))?;

        if let Some(threads) = self.intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(init_err(&model))?;
        }

        if target.device == Device::Cuda {
            builder = builder
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_fp16(target.half_precision())
                        .build(),
                    CUDAExecutionProvider::default().build(),
                ])
                .map_err(init_err(&model))?;
        }

        let session = builder
            .commit_from_file(weights)
            .map_err(init_err(&model))?;
        info!("Loaded {} on {}", model, target);
        Ok(session)
    }
}

fn init_err<E: std::fmt::Display>(model: &str) -> impl Fn(E) -> Error + '_ {
    move |e| Error::ModelInit {
        model: model.to_string(),
        reason: e.to_string(),
    }
}

impl NetworkLoader for OnnxLoader {
    fn load_restorer(
        &self,
        _spec: &ModelSpec,
        weights: &Path,
        target: ExecutionTarget,
    ) -> Result<Box<dyn Network>> {
        Ok(Box::new(OnnxNetwork {
            session: self.session(weights, target)?,
            signed: true,
        }))
    }

    fn load_upsampler(
        &self,
        _spec: &UpsamplerSpec,
        weights: &Path,
        target: ExecutionTarget,
    ) -> Result<Box<dyn Network>> {
        Ok(Box::new(OnnxNetwork {
            session: self.session(weights, target)?,
            signed: false,
        }))
    }

    fn load_detector(
        &self,
        _spec: &DetectorSpec,
        weights: &Path,
        target: ExecutionTarget,
    ) -> Result<Box<dyn FaceDetector>> {
        Ok(Box::new(OnnxFaceDetector {
            session: self.session(weights, target)?,
        }))
    }
}

/// Image-to-image ONNX network.
struct OnnxNetwork {
    session: Session,
    /// Whether the graph works in `[-1, 1]` instead of `[0, 1]`.
    signed: bool,
}

impl Network for OnnxNetwork {
    fn forward(&mut self, input: &Rgb32FImage) -> Result<Rgb32FImage> {
        let (w, h) = input.dimensions();
        let signed = self.signed;
        let data = to_nchw(input, |v| if signed { v.mul_add(2.0, -1.0) } else { v });

        let tensor = Tensor::from_array((vec![1_i64, 3, i64::from(h), i64::from(w)], data))
            .map_err(|e| Error::inference(format!("input tensor: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| Error::inference(e.to_string()))?;
        let (shape, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::inference(format!("output tensor: {e}")))?;

        from_nchw(shape, raw, |v| if signed { (v + 1.0) * 0.5 } else { v })
    }
}

fn to_nchw(image: &Rgb32FImage, map: impl Fn(f32) -> f32) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0; plane * 3];
    for (i, px) in image.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = map(px.0[c]);
        }
    }
    data
}

fn from_nchw(shape: &[i64], raw: &[f32], map: impl Fn(f32) -> f32) -> Result<Rgb32FImage> {
    let &[1, 3, h, w] = shape else {
        return Err(Error::inference(format!(
            "expected output shape [1, 3, h, w], got {shape:?}"
        )));
    };
    let (w, h) = (
        u32::try_from(w).map_err(|_| Error::inference("negative output width"))?,
        u32::try_from(h).map_err(|_| Error::inference("negative output height"))?,
    );
    let plane = (w * h) as usize;
    if raw.len() != plane * 3 {
        return Err(Error::inference(format!(
            "output has {} values, shape implies {}",
            raw.len(),
            plane * 3
        )));
    }

    Ok(Rgb32FImage::from_fn(w, h, |x, y| {
        let i = (y * w + x) as usize;
        Rgb([
            map(raw[i]).clamp(0.0, 1.0),
            map(raw[plane + i]).clamp(0.0, 1.0),
            map(raw[2 * plane + i]).clamp(0.0, 1.0),
        ])
    }))
}

/// `RetinaFace`-style detector exported with decoding and NMS in the graph.
struct OnnxFaceDetector {
    session: Session,
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>> {
        let (w, h) = image.dimensions();
        let longest = w.max(h).max(1);
        let scale = DETECTION_INPUT_SIZE as f32 / longest as f32;
        let (rw, rh) = (
            ((w as f32 * scale).round() as u32).max(1),
            ((h as f32 * scale).round() as u32).max(1),
        );
        let resized = imageops::resize(image, rw, rh, FilterType::Triangle);

        let plane = (rw * rh) as usize;
        let mut data = vec![0.0; plane * 3];
        for (i, px) in resized.pixels().enumerate() {
            // RGB -> BGR
            for (c, channel) in [2usize, 1, 0].into_iter().enumerate() {
                data[c * plane + i] = f32::from(px.0[channel]) - DETECTOR_MEAN_BGR[c];
            }
        }

        let tensor = Tensor::from_array((vec![1_i64, 3, i64::from(rh), i64::from(rw)], data))
            .map_err(|e| Error::inference(format!("detector input tensor: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| Error::inference(e.to_string()))?;
        let (shape, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::inference(format!("detector output tensor: {e}")))?;

        if shape.len() != 2 || shape[1] != 15 {
            return Err(Error::inference(format!(
                "expected detector output [n, 15], got {:?}",
                &shape[..]
            )));
        }

        let inv = 1.0 / scale;
        Ok(raw
            .chunks_exact(15)
            .map(|row| DetectedFace {
                bbox: [row[0] * inv, row[1] * inv, row[2] * inv, row[3] * inv],
                score: row[4],
                landmarks: std::array::from_fn(|k| [row[5 + 2 * k] * inv, row[6 + 2 * k] * inv]),
            })
            .collect())
    }
}
