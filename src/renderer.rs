// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 监控界面 (macroquad + egui)
//!
//! - 左侧: 标注后的摄像头画面, 尺寸由显示预设决定
//! - 右侧: 控制面板 (状态 / 控制 / 设置 / 日志)
//! - 警报窗口: 非阻塞, 监控继续运行, 每个窗口需要单独确认;
//!   弹出时播放提示音, 未确认期间画面四周闪烁红框

mod chime;
mod control_panel;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use control_panel::{ControlPanel, ControlPanelActions, StatusView};
use egui_macroquad::egui;
use image::RgbImage;
use macroquad::audio::{load_sound_from_bytes, play_sound_once, Sound};
use macroquad::prelude::*;

use crate::config::MonitorConfig;
use crate::monitor::{Monitor, TickOutcome};
use crate::presentation::{
    present, AlertQueue, DisplayPreset, EventLog, PresentationSurface, Severity, StatusLine,
};

/// 日志面板保留的行数
const LOG_CAPACITY: usize = 500;
/// 画面与窗口边缘的间距
const MARGIN: f32 = 10.0;

/// 普通错误提示窗口
struct Notice {
    id: u64,
    title: String,
    text: String,
}

/// 展示层状态: 只由 [`present`] 和界面命令修改
pub struct View {
    frame: Option<Texture2D>,
    frame_size: (u32, u32),
    camera_status: (String, Severity),
    detection_status: (String, Severity),
    log: EventLog,
    alerts: AlertQueue,
    notices: Vec<Notice>,
    next_notice: u64,
    alert_sound: Option<Sound>,
}

impl View {
    pub fn new() -> Self {
        Self {
            frame: None,
            frame_size: (0, 0),
            camera_status: ("摄像头状态: 未初始化".to_string(), Severity::Info),
            detection_status: ("检测状态: 等待开始".to_string(), Severity::Info),
            log: EventLog::new(LOG_CAPACITY),
            alerts: AlertQueue::default(),
            notices: Vec::new(),
            next_notice: 0,
            alert_sound: None,
        }
    }

    fn notify(&mut self, title: &str, text: String) {
        self.notices.push(Notice {
            id: self.next_notice,
            title: title.to_string(),
            text,
        });
        self.next_notice += 1;
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSurface for View {
    fn render_frame(&mut self, frame: &RgbImage) {
        let (w, h) = frame.dimensions();
        let rgba = image::DynamicImage::ImageRgb8(frame.clone()).into_rgba8();

        // 只在分辨率变化时重建纹理, 否则更新像素数据
        match &self.frame {
            Some(tex) if self.frame_size == (w, h) => {
                let img = Image {
                    bytes: rgba.into_raw(),
                    width: w as u16,
                    height: h as u16,
                };
                tex.update(&img);
            }
            _ => {
                let texture = Texture2D::from_rgba8(w as u16, h as u16, &rgba);
                texture.set_filter(FilterMode::Linear);
                self.frame = Some(texture);
                self.frame_size = (w, h);
            }
        }
    }

    fn set_status_text(&mut self, line: StatusLine, text: &str, severity: Severity) {
        let slot = match line {
            StatusLine::Camera => &mut self.camera_status,
            StatusLine::Detection => &mut self.detection_status,
        };
        *slot = (text.to_string(), severity);
    }

    fn show_alert_dialog(&mut self, count: usize, evidence: Option<&Path>) -> anyhow::Result<()> {
        if self.alerts.push(count, evidence).is_none() {
            tracing::warn!("⚠️ 未确认的警报窗口过多, 新警报计入汇总");
        }
        if let Some(sound) = &self.alert_sound {
            play_sound_once(sound);
        }
        Ok(())
    }

    fn log_event(&mut self, message: &str, severity: Severity) {
        self.log.push(message, severity);
    }
}

pub struct App {
    monitor: Monitor,
    view: View,
    control_panel: ControlPanel,
    chinese_font: Option<Font>,
}

impl App {
    pub fn new(monitor: Monitor, config: &MonitorConfig, alert_sound: Option<Sound>) -> Self {
        let mut control_panel = ControlPanel::new(
            monitor.threshold(),
            monitor.confidence(),
            config.display_preset,
        );
        control_panel.model_name = config
            .model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        control_panel.evidence_dir = monitor.evidence().absolute_dir().display().to_string();

        let chinese_font = load_fonts(&config.font_path);

        let mut view = View::new();
        view.alert_sound = alert_sound;

        let mut app = Self {
            monitor,
            view,
            control_panel,
            chinese_font,
        };

        app.refresh_camera();
        app.view.log_event("系统初始化完成", Severity::Info);
        app.view.log_event("请点击'开始监控'按钮启动系统", Severity::Info);
        app
    }

    fn refresh_camera(&mut self) {
        self.view.log_event("正在刷新摄像头连接...", Severity::Info);
        let was_monitoring = self.monitor.is_monitoring();
        match self.monitor.refresh_camera() {
            Ok(device) => {
                self.view
                    .log_event(&format!("摄像头 {} 连接成功", device), Severity::Ok);
                self.view.set_status_text(
                    StatusLine::Camera,
                    "摄像头状态: 已连接",
                    Severity::Ok,
                );
            }
            Err(e) => {
                self.view
                    .log_event(&format!("摄像头刷新失败: {}", e), Severity::Error);
                self.view.set_status_text(
                    StatusLine::Camera,
                    "摄像头状态: 错误",
                    Severity::Error,
                );
                self.view
                    .notify("摄像头错误", format!("无法初始化摄像头: {}", e));
            }
        }
        if was_monitoring {
            self.on_stopped();
        }
    }

    fn start(&mut self) {
        match self.monitor.start(Instant::now()) {
            Ok(()) => {
                self.view.set_status_text(
                    StatusLine::Detection,
                    "检测状态: 运行中",
                    Severity::Ok,
                );
                self.view.log_event("开始监控", Severity::Info);
            }
            Err(e) => {
                self.view
                    .log_event(&format!("错误: {}", e), Severity::Error);
                self.view.notify("错误", e.to_string());
            }
        }
    }

    fn stop(&mut self) {
        self.monitor.stop();
        self.on_stopped();
    }

    fn on_stopped(&mut self) {
        self.view.set_status_text(
            StatusLine::Detection,
            "检测状态: 已停止",
            Severity::Error,
        );
        self.view.log_event("停止监控", Severity::Info);
    }

    fn open_folder(&mut self) {
        match self.monitor.evidence().open_folder() {
            Ok(path) => self.view.log_event(
                &format!("已打开图片保存目录: {}", path.display()),
                Severity::Info,
            ),
            Err(e) => {
                self.view
                    .log_event(&format!("打开文件夹失败: {}", e), Severity::Error);
                self.view
                    .notify("错误", format!("无法打开文件夹: {}", e));
            }
        }
    }

    fn set_preset(&mut self, preset: DisplayPreset) {
        let (w, h) = preset.size(screen_size_u32());
        self.view.log_event(
            &format!("显示尺寸已更改为: {} ({}x{})", preset.name(), w, h),
            Severity::Info,
        );
    }

    /// 每帧调用: 执行到期的检测周期并刷新界面
    pub fn update(&mut self) {
        if let Some(outcome) = self.monitor.tick(Instant::now()) {
            present(&outcome, &mut self.view);
            if let TickOutcome::CaptureLost(_) = outcome {
                self.view.log_event("停止监控", Severity::Info);
            }
        }
        self.control_panel.monitoring = self.monitor.is_monitoring();
        self.control_panel.device = self.monitor.device();
    }

    pub fn draw(&self) {
        clear_background(Color::from_rgba(20, 20, 30, 255));

        let (w, h) = self.control_panel.preset.size(screen_size_u32());
        let (w, h) = (w as f32, h as f32);

        if let Some(texture) = self.frame() {
            draw_texture_ex(
                texture,
                MARGIN,
                MARGIN,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(w, h)),
                    ..Default::default()
                },
            );
        } else {
            draw_rectangle_lines(MARGIN, MARGIN, w, h, 2.0, GRAY);
            let text = "摄像头预览将显示在这里";
            let font_size = 32;
            let dims = measure_text(text, self.chinese_font.as_ref(), font_size, 1.0);
            draw_text_ex(
                text,
                MARGIN + (w - dims.width) / 2.0,
                MARGIN + (h - dims.height) / 2.0,
                TextParams {
                    font: self.chinese_font.as_ref(),
                    font_size,
                    color: WHITE,
                    ..Default::default()
                },
            );
        }

        // 有未确认的警报时闪烁红框
        if !self.view.alerts.is_empty() && (get_time() * 2.0) as i64 % 2 == 0 {
            draw_rectangle_lines(0.0, 0.0, screen_width(), screen_height(), 12.0, RED);
        }
    }

    fn frame(&self) -> Option<&Texture2D> {
        self.view.frame.as_ref()
    }

    pub fn draw_egui(&mut self) {
        let (w, _) = self.control_panel.preset.size(screen_size_u32());
        let panel_x = (w as f32 + 2.0 * MARGIN)
            .min(screen_width() - 360.0)
            .max(0.0);
        let panel_pos = egui::pos2(panel_x, MARGIN);

        let mut actions = ControlPanelActions::default();
        let mut acked = Vec::new();
        let mut dismissed = Vec::new();
        let mut open_from_alert = false;
        let mut ack_overflow = false;

        egui_macroquad::ui(|ctx| {
            actions = self.control_panel.show(
                ctx,
                StatusView {
                    camera: &self.view.camera_status,
                    detection: &self.view.detection_status,
                    log: &self.view.log,
                },
                panel_pos,
            );

            for (i, dialog) in self.view.alerts.pending().iter().enumerate() {
                let offset = 24.0 * i as f32;
                egui::Window::new("安全警告")
                    .id(egui::Id::new(("alert", dialog.id)))
                    .collapsible(false)
                    .resizable(false)
                    .default_pos(egui::pos2(
                        screen_width() / 2.0 - 250.0 + offset,
                        screen_height() / 2.0 - 150.0 + offset,
                    ))
                    .frame(
                        egui::Frame::window(&ctx.style()).fill(egui::Color32::from_rgb(200, 0, 0)),
                    )
                    .show(ctx, |ui| {
                        ui.colored_label(egui::Color32::WHITE, dialog.body());
                        ui.add_space(8.0);
                        ui.horizontal(|ui| {
                            if ui.button("确 定").clicked() {
                                acked.push(dialog.id);
                            }
                            if ui.button("打开图片路径").clicked() {
                                open_from_alert = true;
                            }
                        });
                    });
            }

            let overflow = self.view.alerts.overflow();
            if overflow > 0 {
                egui::Window::new("安全警告 (汇总)")
                    .id(egui::Id::new("alert_overflow"))
                    .collapsible(false)
                    .resizable(false)
                    .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, MARGIN))
                    .frame(
                        egui::Frame::window(&ctx.style()).fill(egui::Color32::from_rgb(200, 0, 0)),
                    )
                    .show(ctx, |ui| {
                        ui.colored_label(
                            egui::Color32::WHITE,
                            format!("另有 {} 次警报未单独显示, 证据已保存在证据目录", overflow),
                        );
                        ui.horizontal(|ui| {
                            if ui.button("确 定").clicked() {
                                ack_overflow = true;
                            }
                            if ui.button("打开图片路径").clicked() {
                                open_from_alert = true;
                            }
                        });
                    });
            }

            for notice in &self.view.notices {
                egui::Window::new(&notice.title)
                    .id(egui::Id::new(("notice", notice.id)))
                    .collapsible(false)
                    .resizable(false)
                    .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                    .show(ctx, |ui| {
                        ui.colored_label(egui::Color32::RED, &notice.text);
                        if ui.button("确定").clicked() {
                            dismissed.push(notice.id);
                        }
                    });
            }
        });
        egui_macroquad::draw();

        for id in acked {
            self.view.alerts.acknowledge(id);
        }
        if ack_overflow {
            self.view.alerts.acknowledge_overflow();
        }
        self.view.notices.retain(|n| !dismissed.contains(&n.id));

        if actions.start {
            self.start();
        }
        if actions.stop {
            self.stop();
        }
        if actions.refresh {
            self.refresh_camera();
        }
        if actions.open_folder || open_from_alert {
            self.open_folder();
        }
        if let Some(threshold) = actions.threshold {
            self.monitor.set_threshold(threshold);
            self.control_panel.threshold = self.monitor.threshold();
        }
        if let Some(confidence) = actions.confidence {
            self.monitor.set_confidence(confidence);
            self.control_panel.confidence = self.monitor.confidence();
        }
        if let Some(preset) = actions.preset {
            self.set_preset(preset);
        }
    }

    pub fn shutdown(&mut self) {
        self.monitor.shutdown();
        tracing::info!("👋 监控已退出");
    }
}

fn screen_size_u32() -> (u32, u32) {
    (screen_width().max(0.0) as u32, screen_height().max(0.0) as u32)
}

/// 加载中文字体: macroquad 用于画布文字, egui 用于面板
fn load_fonts(path: &Path) -> Option<Font> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::warn!("⚠️ 未找到中文字体文件: {}", path.display());
            return None;
        }
    };

    let egui_bytes = bytes.clone();
    egui_macroquad::cfg(|ctx| {
        let mut fonts = egui::FontDefinitions::default();
        fonts.font_data.insert(
            "chinese".to_owned(),
            Arc::new(egui::FontData::from_owned(egui_bytes)),
        );
        for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
            fonts
                .families
                .entry(family)
                .or_default()
                .insert(0, "chinese".to_owned());
        }
        ctx.set_fonts(fonts);
    });

    match load_ttf_font_from_bytes(&bytes) {
        Ok(font) => {
            tracing::info!("✅ 中文字体加载成功");
            Some(font)
        }
        Err(e) => {
            tracing::warn!("⚠️ 中文字体加载失败: {}", e);
            None
        }
    }
}

/// 启动失败时的错误界面, 关闭窗口或按 Esc/Enter 退出
/// 合成并加载警报提示音; 没有音频设备时返回 `None`, 只保留画面提示
pub async fn load_alert_sound() -> Option<Sound> {
    match load_sound_from_bytes(&chime::alert_chime_wav()).await {
        Ok(sound) => Some(sound),
        Err(e) => {
            tracing::warn!("⚠️ 无法加载警报提示音: {:?}", e);
            None
        }
    }
}

pub async fn show_fatal(title: &str, message: &str, font_path: &Path) {
    let font = load_fonts(font_path);
    loop {
        clear_background(Color::from_rgba(20, 20, 30, 255));
        let mut close = is_key_pressed(KeyCode::Escape) || is_key_pressed(KeyCode::Enter);

        egui_macroquad::ui(|ctx| {
            egui::Window::new(title)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                .show(ctx, |ui| {
                    ui.colored_label(egui::Color32::RED, message);
                    ui.add_space(8.0);
                    if ui.button("确定").clicked() {
                        close = true;
                    }
                });
        });
        egui_macroquad::draw();

        if font.is_none() {
            draw_text(message, MARGIN, screen_height() - MARGIN, 20.0, RED);
        }

        if close {
            break;
        }
        next_frame().await;
    }
}
