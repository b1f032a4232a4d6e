// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alert; // 警报控制 (阈值 + 冷却)
pub mod config; // 监控配置参数
pub mod detection; // 检测结果与画面标注
pub mod error; // 错误类型
pub mod evidence; // 证据图片存储
pub mod input; // 摄像头输入
pub mod models; // 检测模型接口与 YOLOv8 实现
pub mod monitor; // 检测周期状态机
pub mod presentation; // 展示层接口
pub mod renderer; // macroquad + egui 界面

pub use crate::error::{MonitorError, Result};
pub use crate::models::{ObjectDetector, OrtEP, YOLOv8, YOLOv8Config};
pub use crate::monitor::{Monitor, MonitorState, TickOutcome, TickResult};
