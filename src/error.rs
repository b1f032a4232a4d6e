// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误类型 (Error taxonomy)
//!
//! 除了启动时模型加载失败以外, 所有错误都是局部且可恢复的:
//! 用户通过 "刷新摄像头" 或 "开始监控" 即可恢复。

use std::path::PathBuf;

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 探测列表中没有任何设备能打开并读出一帧
    #[error("无法找到可用的摄像头 (已尝试设备: {tried:?}), 请检查摄像头连接")]
    NoCameraAvailable { tried: Vec<usize> },

    /// 没有有效的采集句柄时尝试开始监控
    #[error("摄像头未就绪, 请先刷新摄像头")]
    SourceNotReady,

    /// 读帧失败, 监控降级为空闲
    #[error("无法读取摄像头帧: {0}")]
    FrameReadFailure(String),

    /// 单帧检测失败, 该帧按 0 人处理
    #[error("检测错误: {0}")]
    DetectionFailure(String),

    /// 证据图片保存失败
    #[error("保存证据失败 {path}: {reason}")]
    EvidenceWriteFailure { path: PathBuf, reason: String },

    /// 模型加载失败 (启动时致命)
    #[error("模型加载失败: {0}")]
    ModelLoad(String),

    #[error("配置错误: {0}")]
    Config(String),
}

impl MonitorError {
    /// 是否为启动期致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::ModelLoad(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_model_load_is_fatal() {
        assert!(MonitorError::ModelLoad("missing".into()).is_fatal());
        assert!(!MonitorError::SourceNotReady.is_fatal());
        assert!(!MonitorError::FrameReadFailure("eof".into()).is_fatal());
        assert!(!MonitorError::NoCameraAvailable { tried: vec![0, 1] }.is_fatal());
    }

    #[test]
    fn test_display_lists_probed_devices() {
        let err = MonitorError::NoCameraAvailable { tried: vec![0, 1, 2] };
        assert!(err.to_string().contains("[0, 1, 2]"));
    }
}
