// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统 (Detection System)
///
/// - types:    检测框与单帧检测结果
/// - annotate: 画面标注
pub mod annotate;
pub mod types;

pub use annotate::Annotator;
pub use types::{BBox, Detection, INF_SIZE, PERSON_CLASS};
