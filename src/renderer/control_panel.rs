// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use egui_macroquad::egui;

use crate::config::{CONFIDENCE_RANGE, THRESHOLD_RANGE};
use crate::presentation::{DisplayPreset, EventLog, Severity};

/// 控制面板状态
pub struct ControlPanel {
    // 检测设置
    pub threshold: u32,
    pub confidence: f32,
    pub preset: DisplayPreset,

    // 系统信息
    pub model_name: String,
    pub device: Option<usize>,
    pub monitoring: bool,
    pub evidence_dir: String,
}

/// 面板只读取的状态栏内容
pub struct StatusView<'a> {
    pub camera: &'a (String, Severity),
    pub detection: &'a (String, Severity),
    pub log: &'a EventLog,
}

/// 控制面板操作返回值
#[derive(Default, Debug, PartialEq)]
pub struct ControlPanelActions {
    pub start: bool,
    pub stop: bool,
    pub refresh: bool,
    pub open_folder: bool,
    pub threshold: Option<u32>,
    pub confidence: Option<f32>,
    pub preset: Option<DisplayPreset>,
}

pub fn severity_color(severity: Severity) -> egui::Color32 {
    match severity {
        Severity::Info => egui::Color32::from_rgb(230, 240, 250),
        Severity::Ok => egui::Color32::GREEN,
        Severity::Warning => egui::Color32::YELLOW,
        Severity::Error => egui::Color32::RED,
    }
}

impl ControlPanel {
    pub fn new(threshold: u32, confidence: f32, preset: DisplayPreset) -> Self {
        Self {
            threshold,
            confidence,
            preset,
            model_name: String::new(),
            device: None,
            monitoring: false,
            evidence_dir: String::new(),
        }
    }

    fn set_style(&self, ctx: &egui::Context) {
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill = egui::Color32::from_rgba_premultiplied(20, 24, 32, 230);
        visuals.window_stroke = egui::Stroke::new(
            1.0,
            egui::Color32::from_rgba_premultiplied(255, 255, 255, 30),
        );
        visuals.selection.bg_fill = egui::Color32::from_rgba_premultiplied(100, 150, 255, 100);
        visuals.override_text_color = Some(egui::Color32::from_rgb(230, 240, 250));
        ctx.set_visuals(visuals);
    }

    pub fn show(
        &mut self,
        ctx: &egui::Context,
        status: StatusView<'_>,
        pos: egui::Pos2,
    ) -> ControlPanelActions {
        self.set_style(ctx);

        egui::Window::new("🎯 防偷看监控")
            .default_pos(pos)
            .default_size(egui::vec2(360.0, 640.0))
            .resizable(true)
            .title_bar(true)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| self.ui(ui, &status))
                    .inner
            })
            .and_then(|r| r.inner)
            .unwrap_or_default()
    }

    /// 绘制控制面板UI
    fn ui(&mut self, ui: &mut egui::Ui, status: &StatusView<'_>) -> ControlPanelActions {
        let mut actions = ControlPanelActions::default();

        ui.style_mut().visuals.collapsing_header_frame = false;

        // --- 状态 ---
        egui::CollapsingHeader::new("📊 系统状态")
            .default_open(true)
            .show(ui, |ui| {
                ui.colored_label(severity_color(status.camera.1), &status.camera.0);
                ui.colored_label(severity_color(status.detection.1), &status.detection.0);
                ui.label(format!("当前模型: {}", self.model_name));
                match self.device {
                    Some(device) => ui.label(format!("摄像头设备: {}", device)),
                    None => ui.label("摄像头设备: 无"),
                };
            });

        ui.separator();

        // --- 控制 ---
        egui::CollapsingHeader::new("🎮 监控控制")
            .default_open(true)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(!self.monitoring, egui::Button::new("▶ 开始监控"))
                        .clicked()
                    {
                        actions.start = true;
                    }
                    if ui
                        .add_enabled(self.monitoring, egui::Button::new("⏹ 停止监控"))
                        .clicked()
                    {
                        actions.stop = true;
                    }
                });
                ui.horizontal(|ui| {
                    if ui.button("🔄 刷新摄像头").clicked() {
                        actions.refresh = true;
                    }
                    if ui.button("📂 打开图片路径").clicked() {
                        actions.open_folder = true;
                    }
                });
                ui.small(format!("证据目录: {}", self.evidence_dir));
            });

        ui.separator();

        // --- 检测设置 ---
        egui::CollapsingHeader::new("⚙️ 检测设置")
            .default_open(true)
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label("警报人数阈值:");
                    if ui
                        .add(
                            egui::DragValue::new(&mut self.threshold)
                                .range(THRESHOLD_RANGE.0..=THRESHOLD_RANGE.1),
                        )
                        .changed()
                    {
                        actions.threshold = Some(self.threshold);
                    }
                });

                if ui
                    .add(
                        egui::Slider::new(
                            &mut self.confidence,
                            CONFIDENCE_RANGE.0..=CONFIDENCE_RANGE.1,
                        )
                        .step_by(0.1)
                        .text("检测置信度"),
                    )
                    .changed()
                {
                    actions.confidence = Some(self.confidence);
                }

                let mut selected = self.preset;
                egui::ComboBox::from_id_salt("display_preset")
                    .selected_text(selected.name())
                    .show_ui(ui, |ui| {
                        for preset in DisplayPreset::ALL {
                            ui.selectable_value(&mut selected, preset, preset.name());
                        }
                    });
                ui.label("显示尺寸");
                if selected != self.preset {
                    self.preset = selected;
                    actions.preset = Some(selected);
                }
            });

        ui.separator();

        // --- 日志 ---
        egui::CollapsingHeader::new("📝 系统日志")
            .default_open(true)
            .show(ui, |ui| {
                egui::ScrollArea::vertical()
                    .id_salt("event_log")
                    .max_height(240.0)
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for entry in status.log.entries() {
                            ui.colored_label(severity_color(entry.severity), &entry.line);
                        }
                    });
            });

        actions
    }
}
