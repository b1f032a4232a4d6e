// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入系统 (Video Input System)
///
/// - CaptureBackend: 按设备索引打开摄像头
/// - CaptureHandle: 已打开的摄像头, 逐帧读取
/// - acquire_source: 按探测列表依次尝试, 返回第一个能读出画面的设备
/// - FfmpegCamera: 基于 ez-ffmpeg 的本地摄像头 (DirectShow/AVFoundation/V4L2)
pub mod camera;
pub mod decode_filter;

pub use camera::{get_camera_devices, FfmpegCamera};
pub use decode_filter::DecodeFilter;

use image::RgbImage;

use crate::error::{MonitorError, Result};

/// 采集参数 (分辨率 + 帧率)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// 已打开的采集设备
pub trait CaptureHandle {
    fn device(&self) -> usize;

    /// 读取最新一帧
    fn read_frame(&mut self) -> Result<RgbImage>;

    /// 调整分辨率与帧率, 设备不支持时返回错误但句柄仍可用
    fn set_parameters(&mut self, params: CaptureParams) -> Result<()>;

    /// 释放设备, 之后读帧一律失败
    fn release(&mut self);
}

/// 采集后端
pub trait CaptureBackend {
    fn open(&mut self, device: usize) -> Result<Box<dyn CaptureHandle>>;
}

/// 按顺序探测设备, 第一个能读出一帧的设备胜出
///
/// 胜出设备会尝试切换到 `params`, 失败只记录警告。
/// 探测失败的设备在尝试下一个之前释放。
pub fn acquire_source(
    backend: &mut dyn CaptureBackend,
    probe_devices: &[usize],
    params: CaptureParams,
) -> Result<Box<dyn CaptureHandle>> {
    let mut tried = Vec::with_capacity(probe_devices.len());

    for &device in probe_devices {
        tried.push(device);
        tracing::info!("📷 尝试摄像头 {}", device);

        let mut handle = match backend.open(device) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::debug!("摄像头 {} 无法打开: {}", device, e);
                continue;
            }
        };

        if let Err(e) = handle.read_frame() {
            tracing::debug!("摄像头 {} 无法读帧: {}", device, e);
            handle.release();
            continue;
        }

        if let Err(e) = handle.set_parameters(params) {
            tracing::warn!(
                "⚠️ 摄像头 {} 不支持 {}x{}@{}fps, 使用默认参数: {}",
                device,
                params.width,
                params.height,
                params.fps,
                e
            );
        }

        tracing::info!("✅ 成功打开摄像头 {}", device);
        return Ok(handle);
    }

    tracing::error!("❌ 无法找到可用的摄像头, 已尝试: {:?}", tried);
    Err(MonitorError::NoCameraAvailable { tried })
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeBackend, FakeDevice};
    use super::*;

    const PROBE: [usize; 5] = [0, 1, 2, 3, 4];

    #[test]
    fn test_first_working_device_wins() {
        let mut backend = FakeBackend::with(vec![(0, FakeDevice::working()), (1, FakeDevice::working())]);
        let handle = acquire_source(&mut backend, &PROBE, CaptureParams::default()).unwrap();
        assert_eq!(handle.device(), 0);
        assert_eq!(backend.opened(), vec![0]);
    }

    #[test]
    fn test_falls_through_to_later_device() {
        let mut backend = FakeBackend::with(vec![
            (1, FakeDevice::unreadable()),
            (3, FakeDevice::working()),
        ]);
        let handle = acquire_source(&mut backend, &PROBE, CaptureParams::default()).unwrap();
        assert_eq!(handle.device(), 3);
        assert_eq!(backend.opened(), vec![0, 1, 2, 3]);
        // 打开了但读不出帧的设备要释放
        assert_eq!(backend.released(), vec![1]);
    }

    #[test]
    fn test_no_camera_lists_tried_devices() {
        let mut backend = FakeBackend::with(vec![(2, FakeDevice::unreadable())]);
        let err = acquire_source(&mut backend, &PROBE, CaptureParams::default())
            .err()
            .unwrap();
        match err {
            MonitorError::NoCameraAvailable { tried } => assert_eq!(tried, vec![0, 1, 2, 3, 4]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(backend.released(), vec![2]);
    }

    #[test]
    fn test_parameter_rejection_is_not_fatal() {
        let device = FakeDevice {
            accepts_params: false,
            ..FakeDevice::working()
        };
        let mut backend = FakeBackend::with(vec![(0, device)]);
        let params = CaptureParams::default();
        let mut handle = acquire_source(&mut backend, &PROBE, params).unwrap();
        assert!(handle.read_frame().is_ok());
        assert_eq!(backend.log.lock().unwrap().params, vec![(0, params)]);
    }
}
