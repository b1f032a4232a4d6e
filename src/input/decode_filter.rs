// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg解码过滤器模块
/// FFmpeg decode filter: 摄像头 YUV420P 帧 → RGB 帧
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;

/// 单边最大分辨率, 超过视为损坏帧
const MAX_SIDE: u32 = 4096;

pub struct DecodeFilter {
    device: usize,
    tx: Sender<RgbImage>,
    stop: Arc<AtomicBool>,
    count: usize,
    total_frames: usize,
    dropped_frames: usize,
    last: Instant,
}

impl DecodeFilter {
    pub fn new(device: usize, tx: Sender<RgbImage>, stop: Arc<AtomicBool>) -> Self {
        Self {
            device,
            tx,
            stop,
            count: 0,
            total_frames: 0,
            dropped_frames: 0,
            last: Instant::now(),
        }
    }

    fn drop_frame(&mut self, reason: &str) -> Result<Option<Frame>, String> {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            tracing::warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
        Ok(None)
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        tracing::debug!("✅ 摄像头 {} 解码线程启动", self.device);
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 句柄已释放, 结束解码
        if self.stop.load(Ordering::Relaxed) {
            return Err("capture released".to_string());
        }

        self.total_frames += 1;

        let rgb = unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                return self.drop_frame("空帧/损坏帧");
            }

            let raw = &*frame.as_ptr();
            let w = raw.width.max(0) as u32;
            let h = raw.height.max(0) as u32;
            if w == 0 || h == 0 || w > MAX_SIDE || h > MAX_SIDE {
                return self.drop_frame(&format!("非法分辨率 {}x{}", w, h));
            }

            let y_stride = raw.linesize[0].max(0) as usize;
            let uv_stride = raw.linesize[1].max(0) as usize;
            if raw.data[0].is_null() || raw.data[1].is_null() || raw.data[2].is_null() {
                return self.drop_frame("YUV指针为空");
            }
            if y_stride < w as usize || uv_stride < (w as usize).div_ceil(2) {
                return self.drop_frame(&format!(
                    "步长异常 y_stride={} uv_stride={}",
                    y_stride, uv_stride
                ));
            }

            let uv_rows = (h as usize).div_ceil(2);
            let planes = Yuv420p {
                y: std::slice::from_raw_parts(raw.data[0], y_stride * h as usize),
                u: std::slice::from_raw_parts(raw.data[1], uv_stride * uv_rows),
                v: std::slice::from_raw_parts(raw.data[2], uv_stride * uv_rows),
                y_stride,
                uv_stride,
            };
            planes.to_rgb(w, h)
        };

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 5.0 {
            let fps = self.count as f64 / self.last.elapsed().as_secs_f64();
            tracing::debug!(
                "📺 摄像头 {}: {:.1}fps | 总帧{} | 丢弃{}",
                self.device,
                fps,
                self.total_frames,
                self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        // 通道满说明消费者跟不上, 直接丢掉这一帧; 断开说明句柄已被丢弃
        match self.tx.try_send(rgb) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(Some(frame)),
            Err(TrySendError::Disconnected(_)) => Err("capture receiver dropped".to_string()),
        }
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        tracing::debug!("✅ 摄像头 {} 解码线程退出", self.device);
    }
}

/// YUV420P 平面视图
pub struct Yuv420p<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
}

impl Yuv420p<'_> {
    /// BT.601 整数近似转换
    pub fn to_rgb(&self, width: u32, height: u32) -> RgbImage {
        let (w, h) = (width as usize, height as usize);
        let mut buffer = vec![0u8; w * h * 3];
        let mut out_idx = 0;
        for row in 0..h {
            let y_row = row * self.y_stride;
            let uv_row = (row >> 1) * self.uv_stride;

            for x in 0..w {
                let y_val = self.y[y_row + x] as i32;
                let u_val = self.u[uv_row + (x >> 1)] as i32 - 128;
                let v_val = self.v[uv_row + (x >> 1)] as i32 - 128;

                buffer[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
                buffer[out_idx + 1] =
                    (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
                buffer[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
                out_idx += 3;
            }
        }
        // 尺寸与缓冲区长度一致, 不会失败
        RgbImage::from_raw(width, height, buffer).unwrap_or_else(|| RgbImage::new(width, height))
    }
}
