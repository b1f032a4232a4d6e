// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 防偷看监控系统 (Anti-peek monitor)
///
/// 摄像头画面中人数达到阈值时弹出警报并保存证据图片。
/// 参数通过工作目录下的 anti_peek.json 调整。
use anyhow::{Context, Result};
use macroquad::prelude::*;
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

use anti_peek::config::{MonitorConfig, CONFIG_PATH};
use anti_peek::detection::Annotator;
use anti_peek::error::MonitorError;
use anti_peek::evidence::EvidenceStore;
use anti_peek::input::FfmpegCamera;
use anti_peek::models::{ensure_model, ObjectDetector, YOLOv8, YOLOv8Config};
use anti_peek::monitor::Monitor;
use anti_peek::renderer::{load_alert_sound, show_fatal, App};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn window_conf() -> Conf {
    Conf {
        window_title: "防偷看监控系统 - YOLOv8".to_owned(),
        window_width: 1400,
        window_height: 900,
        window_resizable: true,
        high_dpi: true,
        ..Default::default()
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("⚠️ 日志过滤器 {:?} 无效: {}, 使用 info", filter, e);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_detector(config: &MonitorConfig) -> Result<Box<dyn ObjectDetector>> {
    ensure_model(&config.model_path, config.model_url.as_deref())?;
    let model = YOLOv8::new(YOLOv8Config {
        model: config.model_path.clone(),
        ep: config.execution_provider,
        inf_size: config.inference_size,
        iou: config.iou_threshold,
        profile: config.profile_inference,
    })
    .with_context(|| format!("无法初始化 YOLOv8 ({})", config.model_path.display()))?;
    model.summary();
    Ok(Box::new(model))
}

#[macroquad::main(window_conf)]
async fn main() {
    let config = MonitorConfig::load(CONFIG_PATH);
    init_tracing(&config.log_filter);
    tracing::info!("🚀 启动防偷看监控系统...");
    config.print_summary();

    let detector = match load_detector(&config) {
        Ok(detector) => {
            tracing::info!("✅ YOLOv8 模型加载成功");
            detector
        }
        Err(e) => {
            let err = MonitorError::ModelLoad(format!("{:#}", e));
            tracing::error!("❌ {}", err);
            show_fatal("启动错误", &err.to_string(), &config.font_path).await;
            return;
        }
    };

    let store = EvidenceStore::open(&config.evidence_dir).unwrap_or_else(|e| {
        tracing::warn!("⚠️ {}, 将在第一次警报时重试", e);
        EvidenceStore::new(&config.evidence_dir)
    });

    let monitor = Monitor::new(
        &config,
        Box::new(FfmpegCamera::new(config.frame_timeout())),
        detector,
        store,
        Annotator::new(&config.font_path),
    );

    let alert_sound = load_alert_sound().await;
    let mut app = App::new(monitor, &config, alert_sound);

    prevent_quit();
    loop {
        if is_quit_requested() {
            break;
        }
        app.update();
        app.draw();
        app.draw_egui();
        next_frame().await;
    }

    app.shutdown();
}
