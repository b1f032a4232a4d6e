// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测模型统一接口与实现
///
/// # 架构说明
///
/// 监控循环只依赖 [`ObjectDetector`] trait:
/// 输入一帧 + 置信度阈值, 输出带类别与置信度的检测框。
/// 具体的预处理 / 推理 / 后处理由各模型自行实现。
///
/// ```text
/// 原始帧 → preprocess → ndarray张量
///        ↓
///    ONNX Runtime
///        ↓
/// 原始输出 → postprocess (阈值 + NMS) → Vec<BBox>
/// ```
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::detection::BBox;

pub mod yolov8;

pub use yolov8::{YOLOv8, YOLOv8Config};

/// 推理后端 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrtEP {
    #[default]
    CPU,
    CUDA(i32),
    Trt(i32),
}

/// 目标检测器接口
pub trait ObjectDetector {
    /// 对一帧执行检测, 返回所有类别的检测框 (原始帧坐标)
    ///
    /// # Arguments
    /// * `frame` - RGB 帧
    /// * `confidence` - 置信度阈值, 低于此值的框被丢弃
    fn infer(&mut self, frame: &RgbImage, confidence: f32) -> Result<Vec<BBox>>;

    /// 打印模型信息
    fn summary(&self) {}
}

/// 确保模型文件存在; 缺失且提供了下载地址时下载一次
pub fn ensure_model(path: &Path, url: Option<&str>) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }
    let Some(url) = url else {
        bail!("模型文件不存在: {}", path.display());
    };

    tracing::info!("⬇️  模型不存在, 开始下载: {}", url);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("无法创建模型目录 {}", parent.display()))?;
    }

    let response = ureq::get(url)
        .call()
        .with_context(|| format!("模型下载失败: {}", url))?;

    // 先写临时文件, 下载完整后再改名, 避免留下半个模型
    let tmp = path.with_extension("onnx.part");
    if let Err(e) = write_model(&mut response.into_reader(), &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).with_context(|| format!("无法保存模型 {}", path.display()))?;

    tracing::info!("✅ 模型下载完成: {}", path.display());
    Ok(())
}

/// 把下载流完整写入 `dest`, flush 失败同样视为下载失败
fn write_model(reader: &mut impl Read, dest: &Path) -> Result<()> {
    let file = File::create(dest).with_context(|| format!("无法写入 {}", dest.display()))?;
    let mut writer = BufWriter::new(&file);
    io::copy(reader, &mut writer).context("模型下载中断")?;
    writer
        .flush()
        .with_context(|| format!("无法写入 {}", dest.display()))?;
    drop(writer);
    file.sync_all()
        .with_context(|| format!("无法写入 {}", dest.display()))
}

/// 非极大值抑制: 按置信度降序, 同类别 IOU 超过阈值的框被丢弃
pub fn non_max_suppression(xs: &mut Vec<BBox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].class_id != xs[index].class_id {
                continue;
            }
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, confidence: f32, class_id: u32) -> BBox {
        BBox {
            x1,
            y1: 0.0,
            x2: x1 + 10.0,
            y2: 10.0,
            confidence,
            class_id,
        }
    }

    #[test]
    fn test_nms_keeps_highest_overlapping() {
        let mut xs = vec![bbox(0.0, 0.6, 0), bbox(1.0, 0.9, 0), bbox(50.0, 0.5, 0)];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].confidence, 0.9);
        assert_eq!(xs[1].x1, 50.0);
    }

    #[test]
    fn test_nms_is_per_class() {
        let mut xs = vec![bbox(0.0, 0.9, 0), bbox(0.0, 0.8, 63)];
        non_max_suppression(&mut xs, 0.45);
        assert_eq!(xs.len(), 2);
    }

    #[test]
    fn test_ensure_model_missing_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_model(&dir.path().join("yolov8n.onnx"), None).unwrap_err();
        assert!(err.to_string().contains("yolov8n.onnx"));
    }

    #[test]
    fn test_ensure_model_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yolov8n.onnx");
        fs::write(&path, b"onnx").unwrap();
        assert!(ensure_model(&path, Some("http://127.0.0.1:1/unused")).is_ok());
    }

    #[test]
    fn test_write_model_copies_stream() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("yolov8n.onnx.part");
        write_model(&mut &b"onnx-bytes"[..], &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"onnx-bytes");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_model_reports_full_disk() {
        assert!(write_model(&mut &b"onnx-bytes"[..], Path::new("/dev/full")).is_err());
    }
}
