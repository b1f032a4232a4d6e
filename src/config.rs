// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 监控配置 - 通过JSON文件调整参数

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detection::INF_SIZE;
use crate::error::{MonitorError, Result};
use crate::models::OrtEP;
use crate::presentation::DisplayPreset;

/// 默认配置文件路径
pub const CONFIG_PATH: &str = "anti_peek.json";

pub const THRESHOLD_RANGE: (u32, u32) = (1, 10);
pub const CONFIDENCE_RANGE: (f32, f32) = (0.1, 0.9);

/// 监控参数配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    // === 模型参数 ===
    pub model_path: PathBuf,          // ONNX 模型路径
    pub model_url: Option<String>,    // 模型缺失时的下载地址
    pub inference_size: u32,          // 推理输入尺寸
    pub execution_provider: OrtEP,    // 推理后端
    pub iou_threshold: f32,           // NMS IOU阈值
    pub confidence_threshold: f32,    // 检测置信度 (0.1 ~ 0.9)
    pub profile_inference: bool,      // debug 日志输出各阶段耗时

    // === 警报参数 ===
    pub alert_threshold: u32,     // 警报人数阈值 (1 ~ 10)
    pub alert_cooldown_secs: u64, // 警报冷却时间
    pub tick_interval_ms: u64,    // 检测周期
    pub evidence_dir: PathBuf,    // 证据保存目录

    // === 摄像头参数 ===
    pub probe_devices: Vec<usize>, // 按顺序探测的设备索引
    pub capture_width: u32,
    pub capture_height: u32,
    pub capture_fps: u32,
    pub frame_timeout_ms: u64, // 单帧读取超时

    // === 界面 ===
    pub display_preset: DisplayPreset,
    pub font_path: PathBuf,

    // === 日志 ===
    pub log_filter: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            model_url: None,
            inference_size: INF_SIZE,
            execution_provider: OrtEP::CPU,
            iou_threshold: 0.45,
            confidence_threshold: 0.5,
            profile_inference: false,

            alert_threshold: 2,
            alert_cooldown_secs: 10,
            tick_interval_ms: 30,
            evidence_dir: PathBuf::from("detection_records"),

            probe_devices: vec![0, 1, 2, 3, 4],
            capture_width: 1280,
            capture_height: 720,
            capture_fps: 30,
            frame_timeout_ms: 2000,

            display_preset: DisplayPreset::Large,
            font_path: PathBuf::from("assets/font/msyh.ttc"),

            log_filter: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    /// 解析JSON配置, 越界参数收敛到合法范围
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str::<Self>(json)
            .map(Self::sanitized)
            .map_err(|e| MonitorError::Config(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    tracing::info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("⚠️  {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    tracing::error!("❌ 保存配置失败: {}", e);
                } else {
                    tracing::info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => tracing::error!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 把越界的参数收敛到合法范围
    pub fn sanitized(mut self) -> Self {
        self.alert_threshold = clamp_threshold(self.alert_threshold);
        self.confidence_threshold = clamp_confidence(self.confidence_threshold);
        self.alert_cooldown_secs = self.alert_cooldown_secs.max(1);
        self.tick_interval_ms = self.tick_interval_ms.max(1);
        self.iou_threshold = self.iou_threshold.clamp(0.0, 1.0);
        if self.inference_size == 0 || self.inference_size % 32 != 0 {
            tracing::warn!(
                "⚠️  推理尺寸 {} 不是32的倍数, 使用 {}",
                self.inference_size,
                INF_SIZE
            );
            self.inference_size = INF_SIZE;
        }
        if self.probe_devices.is_empty() {
            self.probe_devices = Self::default().probe_devices;
        }
        self
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        tracing::info!("🎛️  当前监控配置:");
        tracing::info!("  模型: {} ({:?})", self.model_path.display(), self.execution_provider);
        tracing::info!("  警报人数阈值: {}", self.alert_threshold);
        tracing::info!("  检测置信度: {:.1}", self.confidence_threshold);
        tracing::info!("  警报冷却: {}s", self.alert_cooldown_secs);
        tracing::info!("  探测设备: {:?}", self.probe_devices);
        tracing::info!("  证据目录: {}", self.evidence_dir.display());
    }
}

pub fn clamp_threshold(value: u32) -> u32 {
    value.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1)
}

/// 置信度收敛到 [0.1, 0.9] 并按 0.1 取整 (与界面滑块步长一致)
pub fn clamp_confidence(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.5;
    }
    let stepped = (value * 10.0).round() / 10.0;
    stepped.clamp(CONFIDENCE_RANGE.0, CONFIDENCE_RANGE.1)
}
