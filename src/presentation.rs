// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 展示层接口 (Presentation surface)
//!
//! 监控循环只产出 [`TickOutcome`], 由 [`present`] 映射到任意实现了
//! [`PresentationSurface`] 的界面上; 界面从不直接改动摄像头或检测器。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::Local;
use image::RgbImage;
use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::alert::AlertDecision;
use crate::monitor::{TickOutcome, TickResult};

/// 状态 / 日志的严重程度, 决定显示颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Ok,
    Warning,
    Error,
}

/// 状态栏上的两行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLine {
    Camera,
    Detection,
}

pub trait PresentationSurface {
    fn render_frame(&mut self, frame: &RgbImage);

    fn set_status_text(&mut self, line: StatusLine, text: &str, severity: Severity);

    /// 弹出警报对话框; 失败只记录日志, 不影响监控
    fn show_alert_dialog(&mut self, count: usize, evidence: Option<&Path>) -> anyhow::Result<()>;

    fn log_event(&mut self, message: &str, severity: Severity);
}

/// 把一个周期的结果映射到界面
pub fn present(outcome: &TickOutcome, surface: &mut dyn PresentationSurface) {
    match outcome {
        TickOutcome::Frame(result) => present_frame(result, surface),
        TickOutcome::CaptureLost(e) => {
            surface.log_event(&e.to_string(), Severity::Error);
            surface.set_status_text(StatusLine::Camera, "摄像头状态: 错误", Severity::Error);
            surface.set_status_text(StatusLine::Detection, "检测状态: 已停止", Severity::Error);
        }
    }
}

fn present_frame(result: &TickResult, surface: &mut dyn PresentationSurface) {
    if let Some(e) = &result.detection_error {
        surface.log_event(&e.to_string(), Severity::Warning);
    }

    if result.exceeds_threshold() {
        surface.set_status_text(
            StatusLine::Detection,
            &format!("警告! 检测到 {} 人!", result.person_count),
            Severity::Error,
        );
    } else {
        surface.set_status_text(
            StatusLine::Detection,
            &format!("检测到 {} 人", result.person_count),
            Severity::Ok,
        );
    }

    if let AlertDecision::Alert { count } = result.decision {
        match &result.evidence {
            Some(Ok(record)) => surface.log_event(
                &format!(
                    "警报已触发! 检测到 {} 人, 证据已保存: {}",
                    count,
                    record.path.display()
                ),
                Severity::Warning,
            ),
            Some(Err(e)) => surface.log_event(
                &format!("警报已触发! 检测到 {} 人, {}", count, e),
                Severity::Error,
            ),
            None => {}
        }
        if let Err(e) = surface.show_alert_dialog(count, result.evidence_path()) {
            tracing::warn!("⚠️ 警报窗口显示失败: {:#}", e);
            surface.log_event(&format!("警报窗口显示失败: {:#}", e), Severity::Warning);
        }
    }

    surface.render_frame(&result.frame);
}

// ========== 显示尺寸 ==========

/// 配置文件里可以写英文变体名, 也可以写界面上的中文名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum DisplayPreset {
    Small,
    Medium,
    Large,
    FullScreen,
}

/// 名称 → 预设
static PRESET_NAMES: phf::Map<&'static str, DisplayPreset> = phf_map! {
    "小" => DisplayPreset::Small,
    "中" => DisplayPreset::Medium,
    "大" => DisplayPreset::Large,
    "全屏" => DisplayPreset::FullScreen,
    "Small" => DisplayPreset::Small,
    "Medium" => DisplayPreset::Medium,
    "Large" => DisplayPreset::Large,
    "FullScreen" => DisplayPreset::FullScreen,
};

impl TryFrom<String> for DisplayPreset {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        DisplayPreset::from_name(name.trim())
            .ok_or_else(|| format!("未知的显示尺寸: {} (可选: 小/中/大/全屏)", name))
    }
}

impl DisplayPreset {
    pub const ALL: [DisplayPreset; 4] = [
        DisplayPreset::Small,
        DisplayPreset::Medium,
        DisplayPreset::Large,
        DisplayPreset::FullScreen,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        PRESET_NAMES.get(name).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            DisplayPreset::Small => "小",
            DisplayPreset::Medium => "中",
            DisplayPreset::Large => "大",
            DisplayPreset::FullScreen => "全屏",
        }
    }

    /// 画面显示尺寸; 全屏时四周留出控件空间
    pub fn size(&self, screen: (u32, u32)) -> (u32, u32) {
        match self {
            DisplayPreset::Small => (640, 480),
            DisplayPreset::Medium => (800, 600),
            DisplayPreset::Large => (960, 720),
            DisplayPreset::FullScreen => (
                screen.0.saturating_sub(100).max(1),
                screen.1.saturating_sub(200).max(1),
            ),
        }
    }
}

// ========== 事件日志 ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub line: String,
    pub severity: Severity,
}

/// 有界事件日志, 最新的在末尾
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// 追加 `[HH:MM:SS] message`, 同时写入 tracing
    pub fn push(&mut self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => tracing::error!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Info | Severity::Ok => tracing::info!("{}", message),
        }
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry { line, severity });
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ========== 警报对话框 ==========

/// 同时显示的警报窗口上限, 超出的只计数
pub const MAX_ALERT_DIALOGS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDialog {
    pub id: u64,
    pub count: usize,
    /// 证据的绝对路径, 入队时解析一次
    pub evidence: Option<PathBuf>,
}

impl AlertDialog {
    /// 对话框正文
    pub fn body(&self) -> String {
        let mut text = format!(
            "⚠️ 安全警告 ⚠️\n\n检测到 {} 个人在屏幕前!\n可能有人正在偷看你的屏幕!\n\n",
            self.count
        );
        match &self.evidence {
            Some(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                text.push_str(&format!("证据已保存: {}\n保存路径: {}", name, path.display()));
            }
            None => text.push_str("证据图片保存失败"),
        }
        text
    }
}

/// 未确认的警报队列; 每个对话框都要单独确认。
///
/// 超过 [`MAX_ALERT_DIALOGS`] 的警报不再开新窗口, 累计到一个
/// "另有 N 次警报" 的汇总里, 汇总同样需要确认。
#[derive(Debug, Default)]
pub struct AlertQueue {
    pending: Vec<AlertDialog>,
    overflow: usize,
    next_id: u64,
}

impl AlertQueue {
    /// 入队; 返回新窗口的 id, 已满时返回 `None` 并计入汇总
    pub fn push(&mut self, count: usize, evidence: Option<&Path>) -> Option<u64> {
        if self.pending.len() >= MAX_ALERT_DIALOGS {
            self.overflow += 1;
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(AlertDialog {
            id,
            count,
            evidence: evidence.map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())),
        });
        Some(id)
    }

    pub fn acknowledge(&mut self, id: u64) -> bool {
        let before = self.pending.len();
        self.pending.retain(|d| d.id != id);
        self.pending.len() != before
    }

    pub fn pending(&self) -> &[AlertDialog] {
        &self.pending
    }

    /// 未单独显示的警报数
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    pub fn acknowledge_overflow(&mut self) {
        self.overflow = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.overflow == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Suppression;
    use crate::error::MonitorError;
    use crate::evidence::EvidenceRecord;

    #[derive(Default)]
    struct RecordingSurface {
        frames: usize,
        status: Vec<(StatusLine, String, Severity)>,
        dialogs: Vec<(usize, Option<PathBuf>)>,
        log: Vec<(String, Severity)>,
        fail_dialog: bool,
    }

    impl PresentationSurface for RecordingSurface {
        fn render_frame(&mut self, _frame: &RgbImage) {
            self.frames += 1;
        }

        fn set_status_text(&mut self, line: StatusLine, text: &str, severity: Severity) {
            self.status.push((line, text.to_string(), severity));
        }

        fn show_alert_dialog(&mut self, count: usize, evidence: Option<&Path>) -> anyhow::Result<()> {
            if self.fail_dialog {
                anyhow::bail!("no display");
            }
            self.dialogs.push((count, evidence.map(Path::to_path_buf)));
            Ok(())
        }

        fn log_event(&mut self, message: &str, severity: Severity) {
            self.log.push((message.to_string(), severity));
        }
    }

    fn result(count: usize, decision: AlertDecision, evidence: Option<crate::error::Result<EvidenceRecord>>) -> TickOutcome {
        TickOutcome::Frame(TickResult {
            frame: RgbImage::new(4, 4),
            person_count: count,
            threshold: 2,
            decision,
            evidence,
            detection_error: None,
            at: Local::now(),
        })
    }

    #[test]
    fn test_present_quiet_frame() {
        let mut surface = RecordingSurface::default();
        present(
            &result(1, AlertDecision::NoAlert(Suppression::BelowThreshold), None),
            &mut surface,
        );
        assert_eq!(surface.frames, 1);
        assert_eq!(
            surface.status,
            vec![(StatusLine::Detection, "检测到 1 人".to_string(), Severity::Ok)]
        );
        assert!(surface.dialogs.is_empty());
    }

    #[test]
    fn test_present_alert_with_evidence() {
        let mut surface = RecordingSurface::default();
        let record = EvidenceRecord {
            path: PathBuf::from("detection_records/alert_20240501_120001.jpg"),
            saved_at: Local::now(),
        };
        present(
            &result(3, AlertDecision::Alert { count: 3 }, Some(Ok(record.clone()))),
            &mut surface,
        );
        assert_eq!(surface.status[0].1, "警告! 检测到 3 人!");
        assert_eq!(surface.status[0].2, Severity::Error);
        assert_eq!(surface.dialogs, vec![(3, Some(record.path))]);
    }

    #[test]
    fn test_present_alert_without_evidence_still_shows_dialog() {
        let mut surface = RecordingSurface::default();
        let err = MonitorError::EvidenceWriteFailure {
            path: PathBuf::from("x.jpg"),
            reason: "disk full".into(),
        };
        present(
            &result(2, AlertDecision::Alert { count: 2 }, Some(Err(err))),
            &mut surface,
        );
        assert_eq!(surface.dialogs, vec![(2, None)]);
        assert!(surface.log.iter().any(|(m, s)| m.contains("disk full") && *s == Severity::Error));
    }

    #[test]
    fn test_dialog_failure_is_only_logged() {
        let mut surface = RecordingSurface {
            fail_dialog: true,
            ..Default::default()
        };
        present(&result(2, AlertDecision::Alert { count: 2 }, None), &mut surface);
        assert_eq!(surface.frames, 1);
        assert!(surface.log.iter().any(|(m, _)| m.contains("no display")));
    }

    #[test]
    fn test_present_capture_lost() {
        let mut surface = RecordingSurface::default();
        present(
            &TickOutcome::CaptureLost(MonitorError::FrameReadFailure("eof".into())),
            &mut surface,
        );
        assert_eq!(surface.frames, 0);
        assert!(surface
            .status
            .iter()
            .any(|(line, _, s)| *line == StatusLine::Camera && *s == Severity::Error));
        assert!(surface.log[0].0.contains("eof"));
    }

    #[test]
    fn test_preset_sizes() {
        assert_eq!(DisplayPreset::Small.size((1920, 1080)), (640, 480));
        assert_eq!(DisplayPreset::Large.size((1920, 1080)), (960, 720));
        assert_eq!(DisplayPreset::FullScreen.size((1920, 1080)), (1820, 880));
        for preset in DisplayPreset::ALL {
            assert_eq!(DisplayPreset::from_name(preset.name()), Some(preset));
        }
        assert_eq!(DisplayPreset::from_name("巨大"), None);
    }

    #[test]
    fn test_preset_deserializes_from_either_name() {
        let preset: DisplayPreset = serde_json::from_str("\"全屏\"").unwrap();
        assert_eq!(preset, DisplayPreset::FullScreen);
        let preset: DisplayPreset = serde_json::from_str("\"Medium\"").unwrap();
        assert_eq!(preset, DisplayPreset::Medium);
        let saved = serde_json::to_string(&DisplayPreset::Small).unwrap();
        assert_eq!(serde_json::from_str::<DisplayPreset>(&saved).unwrap(), DisplayPreset::Small);
        assert!(serde_json::from_str::<DisplayPreset>("\"巨大\"").is_err());
    }

    #[test]
    fn test_event_log_is_bounded() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.push(&format!("event {i}"), Severity::Info);
        }
        let lines: Vec<&str> = log.entries().map(|e| e.line.as_str()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("event 2"));
        assert!(lines[2].ends_with("event 4"));
        assert!(lines[2].starts_with('[') && lines[2].as_bytes()[9] == b']');
    }

    #[test]
    fn test_alert_queue_needs_each_ack() {
        let mut queue = AlertQueue::default();
        let a = queue.push(2, None).unwrap();
        let b = queue
            .push(3, Some(Path::new("alert_20240501_120001.jpg")))
            .unwrap();
        assert_eq!(queue.pending().len(), 2);
        assert!(queue.acknowledge(a));
        assert!(!queue.acknowledge(a));
        assert_eq!(queue.pending()[0].id, b);
        assert!(queue.pending()[0].body().contains("alert_20240501_120001.jpg"));
        assert!(queue.acknowledge(b));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_alert_queue_resolves_path_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert_20240501_120001.jpg");
        std::fs::write(&path, b"jpg").unwrap();

        let mut queue = AlertQueue::default();
        queue.push(2, Some(&path)).unwrap();
        let expected = std::fs::canonicalize(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        // 文件之后被删掉也不影响已入队的路径
        assert_eq!(queue.pending()[0].evidence.as_deref(), Some(expected.as_path()));
        assert!(queue.pending()[0].body().contains(&expected.display().to_string()));
    }

    #[test]
    fn test_alert_queue_collapses_past_cap() {
        let mut queue = AlertQueue::default();
        let ids: Vec<Option<u64>> = (0..MAX_ALERT_DIALOGS + 3).map(|i| queue.push(i, None)).collect();
        assert!(ids[..MAX_ALERT_DIALOGS].iter().all(Option::is_some));
        assert!(ids[MAX_ALERT_DIALOGS..].iter().all(Option::is_none));
        assert_eq!(queue.pending().len(), MAX_ALERT_DIALOGS);
        assert_eq!(queue.overflow(), 3);

        for id in ids.into_iter().flatten() {
            assert!(queue.acknowledge(id));
        }
        // 汇总也必须确认
        assert!(!queue.is_empty());
        queue.acknowledge_overflow();
        assert!(queue.is_empty());
    }
}
