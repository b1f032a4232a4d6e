// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 摄像头输入模块
//!
//! 通过 ez-ffmpeg 打开本地摄像头, 支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)。
//! 解码在 FFmpeg 调度线程中进行, 解码后的 RGB 帧经有界通道交给监控循环。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::core::scheduler::ffmpeg_scheduler::{FfmpegScheduler, Running};
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;

use super::decode_filter::DecodeFilter;
use super::{CaptureBackend, CaptureHandle, CaptureParams};
use crate::error::{MonitorError, Result};

/// 解码线程与监控循环之间的缓冲帧数
const FRAME_QUEUE: usize = 2;

#[cfg(target_os = "windows")]
const FORMAT: &str = "dshow";
#[cfg(target_os = "macos")]
const FORMAT: &str = "avfoundation";
#[cfg(target_os = "linux")]
const FORMAT: &str = "v4l2";
#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
const FORMAT: &str = "video4linux2";

/// 基于 FFmpeg 的摄像头后端
#[derive(Clone)]
pub struct FfmpegCamera {
    frame_timeout: Duration,
    // 只有 dshow 需要设备名
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    device_names: Vec<String>,
}

impl FfmpegCamera {
    pub fn new(frame_timeout: Duration) -> Self {
        let device_names: Vec<String> = get_camera_devices()
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        tracing::info!("🔍 找到 {} 个视频设备", device_names.len());
        for (index, name) in device_names.iter().enumerate() {
            tracing::info!("   [{}] {}", index, name);
        }
        Self {
            frame_timeout,
            device_names,
        }
    }

    /// 格式化摄像头URL - 根据平台选择
    fn camera_url(&self, index: usize) -> Option<String> {
        #[cfg(target_os = "windows")]
        {
            // dshow 只认设备名
            self.device_names
                .get(index)
                .map(|name| format!("video={}", name))
        }
        #[cfg(target_os = "linux")]
        {
            Some(format!("/dev/video{}", index))
        }
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            Some(format!("{}", index))
        }
    }

    fn start_stream(
        &self,
        device: usize,
        url: &str,
        params: Option<CaptureParams>,
    ) -> Result<FfmpegStream> {
        let (tx, rx) = bounded(FRAME_QUEUE);
        let stop = Arc::new(AtomicBool::new(false));

        // 构建帧处理管线
        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter(
            "decode",
            Box::new(DecodeFilter::new(device, tx, Arc::clone(&stop))),
        );
        let out = create_null_output().add_frame_pipeline(pipe);

        // 不指定参数时让驱动自行协商, 很多摄像头不支持固定的分辨率/帧率
        let mut input = Input::new(url).set_format(FORMAT);
        if let Some(p) = params {
            let video_size = format!("{}x{}", p.width, p.height);
            let framerate = p.fps.to_string();
            input = input.set_input_opts(
                [
                    ("video_size", video_size.as_str()),
                    ("framerate", framerate.as_str()),
                ]
                .into(),
            );
        }

        let ctx = FfmpegContext::builder()
            .input(input)
            .filter_descs(["format=yuv420p"].into())
            .output(out)
            .build()
            .map_err(|e| MonitorError::FrameReadFailure(format!("构建失败: {}", e)))?;

        let scheduler = ctx
            .start()
            .map_err(|e| MonitorError::FrameReadFailure(format!("启动失败: {}", e)))?;

        Ok(FfmpegStream {
            scheduler: Some(scheduler),
            stop,
            rx,
        })
    }
}

impl CaptureBackend for FfmpegCamera {
    fn open(&mut self, device: usize) -> Result<Box<dyn CaptureHandle>> {
        let url = self.camera_url(device).ok_or_else(|| {
            MonitorError::FrameReadFailure(format!("设备 {} 不存在", device))
        })?;
        tracing::debug!("🔍 使用格式: {}, 输入: {}", FORMAT, url);

        let stream = self.start_stream(device, &url, None)?;
        Ok(Box::new(FfmpegCameraHandle {
            device,
            url,
            frame_timeout: self.frame_timeout,
            stream,
            backend: self.clone(),
        }))
    }
}

/// 正在运行的一路 FFmpeg 解码
struct FfmpegStream {
    scheduler: Option<FfmpegScheduler<Running>>,
    stop: Arc<AtomicBool>,
    rx: Receiver<RgbImage>,
}

impl FfmpegStream {
    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.abort();
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct FfmpegCameraHandle {
    device: usize,
    url: String,
    frame_timeout: Duration,
    stream: FfmpegStream,
    backend: FfmpegCamera,
}

impl CaptureHandle for FfmpegCameraHandle {
    fn device(&self) -> usize {
        self.device
    }

    fn read_frame(&mut self) -> Result<RgbImage> {
        if self.stream.scheduler.is_none() {
            return Err(MonitorError::FrameReadFailure("摄像头已释放".to_string()));
        }
        let frame = match self.stream.rx.recv_timeout(self.frame_timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => {
                return Err(MonitorError::FrameReadFailure(format!(
                    "等待帧超时 ({:?})",
                    self.frame_timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(MonitorError::FrameReadFailure("解码线程已退出".to_string()))
            }
        };
        // 丢掉积压的旧帧, 只处理最新画面
        Ok(self.stream.rx.try_iter().last().unwrap_or(frame))
    }

    fn set_parameters(&mut self, params: CaptureParams) -> Result<()> {
        // 同一设备不能同时被两路解码占用, 先停掉旧的
        self.stream.shutdown();
        let applied = self
            .backend
            .start_stream(self.device, &self.url, Some(params))
            .and_then(|mut stream| match stream.rx.recv_timeout(self.frame_timeout) {
                Ok(_) => Ok(stream),
                Err(e) => {
                    stream.shutdown();
                    Err(MonitorError::FrameReadFailure(format!(
                        "摄像头不支持 {}x{}@{}: {}",
                        params.width, params.height, params.fps, e
                    )))
                }
            });

        match applied {
            Ok(stream) => {
                self.stream = stream;
                Ok(())
            }
            Err(e) => {
                // 回退到驱动默认参数
                self.stream = self.backend.start_stream(self.device, &self.url, None)?;
                Err(e)
            }
        }
    }

    fn release(&mut self) {
        self.stream.shutdown();
        tracing::debug!("📷 摄像头 {} 已释放", self.device);
    }
}

/// 获取可用的摄像头设备列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            tracing::warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
