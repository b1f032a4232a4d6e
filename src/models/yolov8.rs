// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型实现
// 包含: 模型加载、预处理、推理、后处理

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::{Array, Array4};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::{non_max_suppression, ObjectDetector, OrtEP};
use crate::detection::BBox;

const CXYWH_OFFSET: usize = 4;
/// letterbox 填充值
const PAD_VALUE: f32 = 144.0 / 255.0;

/// YOLOv8 模型配置
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: PathBuf,
    pub ep: OrtEP,
    pub inf_size: u32,
    pub iou: f32,
    /// 输出预处理 / 推理 / 后处理耗时
    pub profile: bool,
}

/// YOLOv8 完整模型结构
pub struct YOLOv8 {
    session: Session,
    input_name: String,
    output_name: String,
    height: u32,
    width: u32,
    iou: f32,
    ep: OrtEP,
    profile: bool,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let providers: Vec<ExecutionProviderDispatch> = match config.ep {
            OrtEP::Trt(device_id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ],
            OrtEP::CUDA(device_id) => vec![CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()],
            OrtEP::CPU => vec![CPUExecutionProvider::default().build()],
        };

        let session = Session::builder()
            .context("无法创建 ORT session builder")?
            .with_execution_providers(providers)
            .context("无法注册推理后端")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("无法设置图优化级别")?
            .commit_from_file(&config.model)
            .with_context(|| format!("无法加载模型 {}", config.model.display()))?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => bail!("模型没有输入节点"),
        };
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => bail!("模型没有输出节点"),
        };

        Ok(Self {
            session,
            input_name,
            output_name,
            height: config.inf_size,
            width: config.inf_size,
            iou: config.iou,
            ep: config.ep,
            profile: config.profile,
        })
    }

    pub fn preprocess(&self, x: &RgbImage) -> Result<Array4<f32>> {
        letterbox(x, self.width, self.height)
    }

    pub fn run(&mut self, x: &RgbImage, conf: f32) -> Result<Vec<BBox>> {
        let t_pre = std::time::Instant::now();
        let xs = self.preprocess(x)?;
        if self.profile {
            tracing::debug!("[Model Preprocess]: {:?}", t_pre.elapsed());
        }

        let t_run = std::time::Instant::now();
        let input = Tensor::from_array(xs).context("无法构建输入张量")?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .context("YOLOv8 推理失败")?;
        if self.profile {
            tracing::debug!("[Model Inference]: {:?}", t_run.elapsed());
        }

        let t_post = std::time::Instant::now();
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .context("无法读取 YOLOv8 输出张量")?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let ys = postprocess(
            data,
            &dims,
            x.dimensions(),
            (self.width, self.height),
            conf,
            self.iou,
        )?;
        if self.profile {
            tracing::debug!("[Model Postprocess]: {:?}", t_post.elapsed());
        }

        Ok(ys)
    }
}

impl ObjectDetector for YOLOv8 {
    fn infer(&mut self, frame: &RgbImage, confidence: f32) -> Result<Vec<BBox>> {
        self.run(frame, confidence)
    }

    fn summary(&self) {
        tracing::info!(
            "Summary: > EP: {:?}{} > Input: {} ({}x{}) > Output: {} > iou: {}",
            self.ep,
            if let OrtEP::CPU = self.ep {
                ""
            } else {
                " (May still fall back to CPU)"
            },
            self.input_name,
            self.width,
            self.height,
            self.output_name,
            self.iou,
        );
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 等比缩放到推理尺寸, 贴左上角, 其余区域用灰色填充 (NCHW, 0~1)
pub fn letterbox(x: &RgbImage, width: u32, height: u32) -> Result<Array4<f32>> {
    let (w0, h0) = x.dimensions();
    if w0 == 0 || h0 == 0 {
        bail!("空帧: {}x{}", w0, h0);
    }
    let (_, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, width as f32, height as f32);
    let (w_new, h_new) = ((w_new as u32).clamp(1, width), (h_new as u32).clamp(1, height));

    let src_image = fr::images::Image::from_vec_u8(w0, h0, x.as_raw().clone(), fr::PixelType::U8x3)
        .context("无法创建缩放源图像")?;
    let mut dst_image = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .context("图像缩放失败")?;

    let mut ys = Array::from_elem((1, 3, height as usize, width as usize), PAD_VALUE);
    let w_new = w_new as usize;
    for (i, rgb) in dst_image.buffer().chunks_exact(3).enumerate() {
        let (y, x) = (i / w_new, i % w_new);
        ys[[0, 0, y, x]] = rgb[0] as f32 / 255.0;
        ys[[0, 1, y, x]] = rgb[1] as f32 / 255.0;
        ys[[0, 2, y, x]] = rgb[2] as f32 / 255.0;
    }
    Ok(ys)
}

/// 解码 YOLOv8 检测头输出 `[1, 4 + nc, N]`
///
/// 每列为一个候选框: `cx, cy, w, h, cls0, cls1, ...` (推理尺寸坐标),
/// 取最大类别分数, 低于 `conf` 丢弃, 还原到原始帧坐标后做 NMS。
pub fn postprocess(
    data: &[f32],
    dims: &[usize],
    original: (u32, u32),
    inference: (u32, u32),
    conf: f32,
    iou: f32,
) -> Result<Vec<BBox>> {
    let (rows, anchors) = match dims {
        [1, rows, anchors] => (*rows, *anchors),
        _ => bail!("不支持的输出形状: {:?}", dims),
    };
    if rows <= CXYWH_OFFSET || data.len() < rows * anchors {
        bail!("输出形状与数据长度不符: {:?} / {}", dims, data.len());
    }
    let nc = rows - CXYWH_OFFSET;

    let width_original = original.0 as f32;
    let height_original = original.1 as f32;
    let ratio = (inference.0 as f32 / width_original).min(inference.1 as f32 / height_original);

    let at = |row: usize, i: usize| data[row * anchors + i];

    let mut ys = Vec::new();
    for i in 0..anchors {
        let (id, confidence) = (0..nc)
            .map(|c| (c, at(CXYWH_OFFSET + c, i)))
            .fold((0, f32::MIN), |max, x| if x.1 > max.1 { x } else { max });

        if confidence < conf {
            continue;
        }

        let cx = at(0, i) / ratio;
        let cy = at(1, i) / ratio;
        let w = at(2, i) / ratio;
        let h = at(3, i) / ratio;
        let x1 = (cx - w / 2.).clamp(0.0, width_original);
        let y1 = (cy - h / 2.).clamp(0.0, height_original);
        let x2 = (cx + w / 2.).clamp(0.0, width_original);
        let y2 = (cy + h / 2.).clamp(0.0, height_original);

        ys.push(BBox {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id: id as u32,
        });
    }

    non_max_suppression(&mut ys, iou);
    Ok(ys)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造 `[1, 4 + nc, N]` 列优先输出
    fn fake_output(cands: &[([f32; 4], Vec<f32>)]) -> (Vec<f32>, Vec<usize>) {
        let nc = cands[0].1.len();
        let rows = 4 + nc;
        let n = cands.len();
        let mut data = vec![0.0; rows * n];
        for (i, (b, cls)) in cands.iter().enumerate() {
            for (r, v) in b.iter().chain(cls.iter()).enumerate() {
                data[r * n + i] = *v;
            }
        }
        (data, vec![1, rows, n])
    }

    #[test]
    fn test_postprocess_scales_back_to_original() {
        // 1280x720 → 640 推理, ratio = 0.5
        let (data, dims) = fake_output(&[([100.0, 100.0, 40.0, 80.0], vec![0.9, 0.1])]);
        let ys = postprocess(&data, &dims, (1280, 720), (640, 640), 0.5, 0.45).unwrap();
        assert_eq!(ys.len(), 1);
        let b = &ys[0];
        assert_eq!(b.class_id, 0);
        assert!((b.x1 - 160.0).abs() < 1e-3);
        assert!((b.y1 - 120.0).abs() < 1e-3);
        assert!((b.x2 - 240.0).abs() < 1e-3);
        assert!((b.y2 - 280.0).abs() < 1e-3);
    }

    #[test]
    fn test_postprocess_confidence_and_class() {
        let (data, dims) = fake_output(&[
            ([100.0, 100.0, 20.0, 20.0], vec![0.3, 0.2]),
            ([300.0, 300.0, 20.0, 20.0], vec![0.1, 0.8]),
        ]);
        let ys = postprocess(&data, &dims, (640, 640), (640, 640), 0.5, 0.45).unwrap();
        assert_eq!(ys.len(), 1);
        assert_eq!(ys[0].class_id, 1);

        let ys = postprocess(&data, &dims, (640, 640), (640, 640), 0.25, 0.45).unwrap();
        assert_eq!(ys.len(), 2);
    }

    #[test]
    fn test_postprocess_applies_nms() {
        let (data, dims) = fake_output(&[
            ([100.0, 100.0, 50.0, 50.0], vec![0.7]),
            ([102.0, 101.0, 50.0, 50.0], vec![0.9]),
        ]);
        let ys = postprocess(&data, &dims, (640, 640), (640, 640), 0.5, 0.45).unwrap();
        assert_eq!(ys.len(), 1);
        assert!((ys[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_rejects_bad_shape() {
        assert!(postprocess(&[0.0; 8], &[1, 8], (640, 640), (640, 640), 0.5, 0.45).is_err());
        assert!(postprocess(&[0.0; 4], &[1, 4, 1], (640, 640), (640, 640), 0.5, 0.45).is_err());
    }

    #[test]
    fn test_letterbox_pads_bottom() {
        let img = RgbImage::from_pixel(128, 64, image::Rgb([255, 255, 255]));
        let ys = letterbox(&img, 64, 64).unwrap();
        assert_eq!(ys.shape(), &[1, 3, 64, 64]);
        // 上半部分为图像, 下半部分为填充
        assert!((ys[[0, 0, 10, 10]] - 1.0).abs() < 1e-3);
        assert!((ys[[0, 0, 50, 10]] - PAD_VALUE).abs() < 1e-6);
    }
}
