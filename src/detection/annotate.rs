// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 画面标注: 检测框 + 人数统计 + 警告文字

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use super::types::Detection;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const BOX_THICKNESS: i32 = 3;

pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// 加载字体; 字体缺失时只画框不写字
    pub fn new(font_path: &Path) -> Self {
        let font = match std::fs::read(font_path) {
            // .ttc 字体集合取第一个字体
            Ok(bytes) => match FontVec::try_from_vec_and_index(bytes, 0) {
                Ok(font) => {
                    tracing::info!("✅ 标注字体加载成功: {}", font_path.display());
                    Some(font)
                }
                Err(e) => {
                    tracing::warn!("⚠️ 标注字体解析失败: {}", e);
                    None
                }
            },
            Err(_) => {
                tracing::warn!("⚠️ 未找到字体文件: {}, 仅绘制检测框", font_path.display());
                None
            }
        };
        Self { font }
    }

    pub fn without_text() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 在帧的副本上绘制检测结果
    pub fn annotate(&self, frame: &RgbImage, detection: &Detection, threshold: u32) -> RgbImage {
        let mut canvas = frame.clone();
        let alarming = detection.person_count() >= threshold as usize;
        let color = if alarming { RED } else { GREEN };
        let (w, h) = canvas.dimensions();

        for bbox in &detection.boxes {
            let x1 = bbox.x1.max(0.0) as i32;
            let y1 = bbox.y1.max(0.0) as i32;
            let x2 = (bbox.x2 as i32).min(w as i32 - 1);
            let y2 = (bbox.y2 as i32).min(h as i32 - 1);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            // 加粗边框
            for t in 0..BOX_THICKNESS {
                let bw = (x2 - x1 - 2 * t).max(1) as u32;
                let bh = (y2 - y1 - 2 * t).max(1) as u32;
                draw_hollow_rect_mut(&mut canvas, Rect::at(x1 + t, y1 + t).of_size(bw, bh), color);
            }

            if let Some(font) = &self.font {
                let label = format!("Person: {:.2}", bbox.confidence);
                let ty = (y1 - 24).max(0);
                draw_text_mut(&mut canvas, color, x1, ty, PxScale::from(22.0), font, &label);
            }
        }

        if let Some(font) = &self.font {
            // 左上角人数统计
            draw_filled_rect_mut(&mut canvas, Rect::at(0, 0).of_size(180.min(w), 40.min(h)), BLACK);
            let counter = format!("人数: {}", detection.person_count());
            draw_text_mut(&mut canvas, WHITE, 10, 6, PxScale::from(30.0), font, &counter);

            if alarming {
                draw_text_mut(&mut canvas, RED, 10, 46, PxScale::from(32.0), font, "警告! 多人检测!");
            }
        }

        canvas
    }
}
