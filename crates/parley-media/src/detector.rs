use crate::proctor::{Detection, ObjectDetector, PERSON_CLASS_ID};
use crate::MediaError;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use std::path::Path;

const INPUT_SIZE: usize = 320;
const BACKBONE_CHANNELS: [usize; 5] = [3, 16, 32, 64, 128];
const RAW_SCORE_THRESHOLD: f32 = 0.25;
const NMS_IOU_THRESHOLD: f32 = 0.45;

fn det_err(e: candle_core::Error) -> MediaError {
    MediaError::Detector(e.to_string())
}

/// Compact anchor-free person detector running on the CPU via candle.
///
/// Weights are trained offline and shipped as safetensors; the network is a
/// small stride-2 conv stack with a 1x1 head emitting, per grid cell,
/// `[tx, ty, tw, th, objectness, person]`.
pub struct CandleDetector {
    backbone: Vec<Conv2d>,
    head: Conv2d,
    device: Device,
}

impl CandleDetector {
    pub fn load(path: &Path) -> Result<Self, MediaError> {
        if !path.is_file() {
            return Err(MediaError::Detector(format!(
                "model file not found: {}",
                path.display()
            )));
        }
        let device = Device::Cpu;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[path.to_path_buf()], DType::F32, &device)
                .map_err(det_err)?
        };

        let cfg = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };
        let mut backbone = Vec::with_capacity(BACKBONE_CHANNELS.len() - 1);
        for i in 0..BACKBONE_CHANNELS.len() - 1 {
            let conv = conv2d(
                BACKBONE_CHANNELS[i],
                BACKBONE_CHANNELS[i + 1],
                3,
                cfg,
                vb.pp(format!("backbone.{i}")),
            )
            .map_err(det_err)?;
            backbone.push(conv);
        }
        let head = conv2d(
            BACKBONE_CHANNELS[BACKBONE_CHANNELS.len() - 1],
            6,
            1,
            Conv2dConfig::default(),
            vb.pp("head"),
        )
        .map_err(det_err)?;

        Ok(Self {
            backbone,
            head,
            device,
        })
    }

    fn forward(&self, input: &Tensor) -> Result<Vec<Vec<f32>>, MediaError> {
        let mut xs = input.clone();
        for conv in &self.backbone {
            xs = xs.apply(conv).map_err(det_err)?.relu().map_err(det_err)?;
        }
        let out = self.head.forward(&xs).map_err(det_err)?;
        let out = out.squeeze(0).map_err(det_err)?;
        let (_channels, gh, gw) = out.dims3().map_err(det_err)?;
        let rows = out
            .permute((1, 2, 0))
            .map_err(det_err)?
            .contiguous()
            .map_err(det_err)?
            .reshape((gh * gw, 6))
            .map_err(det_err)?
            .to_vec2::<f32>()
            .map_err(det_err)?;
        Ok(rows)
    }
}

impl ObjectDetector for CandleDetector {
    fn detect(&self, rgb: &image::RgbImage) -> Result<Vec<Detection>, MediaError> {
        let (orig_w, orig_h) = rgb.dimensions();
        let resized = image::imageops::resize(
            rgb,
            INPUT_SIZE as u32,
            INPUT_SIZE as u32,
            image::imageops::FilterType::Triangle,
        );

        let mut data = Vec::with_capacity(3 * INPUT_SIZE * INPUT_SIZE);
        for channel in 0..3 {
            for y in 0..INPUT_SIZE {
                for x in 0..INPUT_SIZE {
                    let pixel = resized.get_pixel(x as u32, y as u32);
                    data.push(pixel[channel] as f32 / 255.0);
                }
            }
        }
        let input = Tensor::from_vec(data, (1, 3, INPUT_SIZE, INPUT_SIZE), &self.device)
            .map_err(det_err)?;

        let grid_size = INPUT_SIZE / (1 << (BACKBONE_CHANNELS.len() - 1));
        let rows = self.forward(&input)?;
        let boxes = decode_grid(&rows, grid_size, grid_size, orig_w as f32, orig_h as f32);
        Ok(non_max_suppression(boxes, NMS_IOU_THRESHOLD))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Turn raw head rows `[tx, ty, tw, th, obj, person]` into image-space
/// person boxes. Box centers are cell-relative; sizes are image fractions.
fn decode_grid(rows: &[Vec<f32>], gw: usize, gh: usize, img_w: f32, img_h: f32) -> Vec<Detection> {
    let mut out = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != 6 {
            continue;
        }
        let score = sigmoid(row[4]) * sigmoid(row[5]);
        if score < RAW_SCORE_THRESHOLD {
            continue;
        }
        let col = (idx % gw) as f32;
        let line = (idx / gw) as f32;
        let cx = (col + sigmoid(row[0])) / gw as f32;
        let cy = (line + sigmoid(row[1])) / gh as f32;
        let w = sigmoid(row[2]);
        let h = sigmoid(row[3]);
        out.push(Detection {
            class_id: PERSON_CLASS_ID,
            score,
            x1: (cx - w / 2.0).max(0.0) * img_w,
            y1: (cy - h / 2.0).max(0.0) * img_h,
            x2: (cx + w / 2.0).min(1.0) * img_w,
            y2: (cy + h / 2.0).min(1.0) * img_h,
        });
    }
    out
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in boxes {
        if kept.iter().all(|k| iou(k, &candidate) < iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
