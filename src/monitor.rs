// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测周期状态机 (Idle / Monitoring)
//!
//! 监控循环独占摄像头句柄与检测器, 每个周期:
//! 读帧 → 检测 → 警报评估 → (警报时) 保存证据 → 标注,
//! 产出一个不可变的 [`TickOutcome`] 交给展示层。
//! 下一个周期在本周期结束之后才排期, 周期之间不会重叠。

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use image::RgbImage;

use crate::alert::{AlertController, AlertDecision};
use crate::config::{clamp_confidence, MonitorConfig};
use crate::detection::{Annotator, Detection};
use crate::error::{MonitorError, Result};
use crate::evidence::{EvidenceRecord, EvidenceStore};
use crate::input::{acquire_source, CaptureBackend, CaptureHandle, CaptureParams};
use crate::models::ObjectDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// 没有排期的检测周期
    Idle,
    /// 按固定周期检测
    Monitoring,
}

/// 一个成功读帧的检测周期
#[derive(Debug)]
pub struct TickResult {
    /// 标注后的画面
    pub frame: RgbImage,
    pub person_count: usize,
    /// 本周期使用的阈值
    pub threshold: u32,
    pub decision: AlertDecision,
    /// 仅在触发警报时有值
    pub evidence: Option<Result<EvidenceRecord>>,
    /// 检测失败时按 0 人处理, 错误放在这里
    pub detection_error: Option<MonitorError>,
    pub at: DateTime<Local>,
}

impl TickResult {
    pub fn exceeds_threshold(&self) -> bool {
        self.person_count >= self.threshold as usize
    }

    pub fn evidence_path(&self) -> Option<&std::path::Path> {
        match &self.evidence {
            Some(Ok(record)) => Some(record.path.as_path()),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Frame(TickResult),
    /// 读帧失败, 已回到 Idle
    CaptureLost(MonitorError),
}

pub struct Monitor {
    backend: Box<dyn CaptureBackend>,
    handle: Option<Box<dyn CaptureHandle>>,
    detector: Box<dyn ObjectDetector>,
    alert: AlertController,
    store: EvidenceStore,
    annotator: Annotator,

    state: MonitorState,
    next_tick: Option<Instant>,
    tick_interval: Duration,
    confidence: f32,
    probe_devices: Vec<usize>,
    capture_params: CaptureParams,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        backend: Box<dyn CaptureBackend>,
        detector: Box<dyn ObjectDetector>,
        store: EvidenceStore,
        annotator: Annotator,
    ) -> Self {
        Self {
            backend,
            handle: None,
            detector,
            alert: AlertController::new(config.alert_threshold, config.alert_cooldown()),
            store,
            annotator,
            state: MonitorState::Idle,
            next_tick: None,
            tick_interval: config.tick_interval(),
            confidence: clamp_confidence(config.confidence_threshold),
            probe_devices: config.probe_devices.clone(),
            capture_params: CaptureParams {
                width: config.capture_width,
                height: config.capture_height,
                fps: config.capture_fps,
            },
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_monitoring(&self) -> bool {
        self.state == MonitorState::Monitoring
    }

    /// 是否持有摄像头句柄
    pub fn has_source(&self) -> bool {
        self.handle.is_some()
    }

    pub fn device(&self) -> Option<usize> {
        self.handle.as_ref().map(|h| h.device())
    }

    pub fn threshold(&self) -> u32 {
        self.alert.threshold()
    }

    pub fn set_threshold(&mut self, threshold: u32) {
        self.alert.set_threshold(threshold);
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = clamp_confidence(confidence);
    }

    pub fn evidence(&self) -> &EvidenceStore {
        &self.store
    }

    /// 释放当前摄像头并从探测列表开头重新探测
    ///
    /// 监控中调用会先停止监控。失败时不持有任何句柄。
    pub fn refresh_camera(&mut self) -> Result<usize> {
        self.stop();
        if let Some(mut handle) = self.handle.take() {
            tracing::info!("📷 释放摄像头 {}", handle.device());
            handle.release();
        }

        let handle = acquire_source(
            self.backend.as_mut(),
            &self.probe_devices,
            self.capture_params,
        )?;
        let device = handle.device();
        self.handle = Some(handle);
        Ok(device)
    }

    /// Idle → Monitoring, 第一个周期立即到期
    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.handle.is_none() {
            return Err(MonitorError::SourceNotReady);
        }
        if self.state == MonitorState::Idle {
            self.state = MonitorState::Monitoring;
            self.next_tick = Some(now);
            tracing::info!("▶️ 开始监控");
        }
        Ok(())
    }

    /// Monitoring → Idle, 取消已排期的周期
    pub fn stop(&mut self) {
        if self.state == MonitorState::Monitoring {
            tracing::info!("⏹️ 停止监控");
        }
        self.state = MonitorState::Idle;
        self.next_tick = None;
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// 到期则执行一个周期, 未到期或 Idle 时返回 None
    pub fn tick(&mut self, now: Instant) -> Option<TickOutcome> {
        self.tick_at(now, Local::now())
    }

    /// 同 [`Monitor::tick`], 证据时间戳由调用方给出
    pub fn tick_at(&mut self, now: Instant, wall: DateTime<Local>) -> Option<TickOutcome> {
        match self.next_tick {
            Some(due) if self.state == MonitorState::Monitoring && now >= due => {}
            _ => return None,
        }

        let outcome = self.run_tick(now, wall);

        if self.state == MonitorState::Monitoring {
            // 本周期结束后才排期下一个
            self.next_tick = Some(Instant::now().max(now) + self.tick_interval);
        }
        Some(outcome)
    }

    fn run_tick(&mut self, now: Instant, wall: DateTime<Local>) -> TickOutcome {
        let read = match self.handle.as_mut() {
            Some(handle) => handle.read_frame(),
            None => Err(MonitorError::SourceNotReady),
        };
        let frame = match read {
            Ok(frame) => frame,
            Err(e) => {
                // 不自动重连, 等用户刷新摄像头
                tracing::error!("❌ 无法读取摄像头帧: {}", e);
                self.stop();
                return TickOutcome::CaptureLost(e);
            }
        };

        let (detection, detection_error) = match self.detector.infer(&frame, self.confidence) {
            Ok(boxes) => (Detection::from_boxes(boxes), None),
            Err(e) => {
                tracing::warn!("⚠️ 检测错误: {:#}", e);
                (
                    Detection::default(),
                    Some(MonitorError::DetectionFailure(format!("{:#}", e))),
                )
            }
        };

        let person_count = detection.person_count();
        let threshold = self.alert.threshold();
        let decision = self.alert.evaluate(person_count, now);

        // 证据保存未标注的原始画面
        let evidence = match decision {
            AlertDecision::Alert { count } => {
                tracing::warn!("🚨 检测到 {} 人, 触发警报", count);
                let saved = self.store.save(&frame, wall);
                if let Err(e) = &saved {
                    tracing::error!("❌ {}", e);
                }
                Some(saved)
            }
            AlertDecision::NoAlert(_) => None,
        };

        let annotated = self.annotator.annotate(&frame, &detection, threshold);

        TickOutcome::Frame(TickResult {
            frame: annotated,
            person_count,
            threshold,
            decision,
            evidence,
            detection_error,
            at: wall,
        })
    }

    /// 释放摄像头 (程序退出时)
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
    }
}
