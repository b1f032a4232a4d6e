// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 证据存储 (Evidence store)
//!
//! 每次警报保存一张 `alert_<YYYYMMDD_HHMMSS>.jpg`, 只追加, 从不覆盖或删除。

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::{MonitorError, Result};

const JPEG_QUALITY: u8 = 90;

/// 已写入磁盘的证据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceRecord {
    pub path: PathBuf,
    pub saved_at: DateTime<Local>,
}

impl EvidenceRecord {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 证据文件名, 秒级时间戳保证按字典序排序即按时间排序
pub fn evidence_file_name(ts: &DateTime<Local>) -> String {
    format!("alert_{}.jpg", ts.format("%Y%m%d_%H%M%S"))
}

/// 编码并落盘; 缓冲区的写入错误 (磁盘满等) 只在 flush 时出现
fn write_jpeg(file: &File, frame: &RgbImage) -> std::result::Result<(), String> {
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(frame)
        .map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())?;
    file.sync_all().map_err(|e| e.to_string())
}

pub struct EvidenceStore {
    dir: PathBuf,
}

impl EvidenceStore {
    /// 不检查目录, 第一次保存时再创建
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 打开证据目录, 不存在则创建
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        store.ensure_dir()?;
        Ok(store)
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| MonitorError::EvidenceWriteFailure {
            path: self.dir.clone(),
            reason: e.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 证据目录的绝对路径 (用于提示和打开文件夹)
    pub fn absolute_dir(&self) -> PathBuf {
        fs::canonicalize(&self.dir).unwrap_or_else(|_| self.dir.clone())
    }

    pub fn save(&self, frame: &RgbImage, saved_at: DateTime<Local>) -> Result<EvidenceRecord> {
        // 目录可能在运行中被删掉
        self.ensure_dir()?;
        let path = self.dir.join(evidence_file_name(&saved_at));
        let fail = |reason: String| MonitorError::EvidenceWriteFailure {
            path: path.clone(),
            reason,
        };

        // create_new: 同一秒内的重名文件不覆盖
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| fail(e.to_string()))?;

        if let Err(reason) = write_jpeg(&file, frame) {
            // 半截文件不算证据
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(fail(reason));
        }

        tracing::info!("💾 证据已保存: {}", path.display());
        Ok(EvidenceRecord { path, saved_at })
    }

    /// 目录中已有的证据文件, 按文件名排序
    pub fn records(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("alert_") && n.ends_with(".jpg"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    }

    /// 用系统文件管理器打开证据目录
    pub fn open_folder(&self) -> std::io::Result<PathBuf> {
        let abs = self.absolute_dir();

        #[cfg(target_os = "windows")]
        let program = "explorer";
        #[cfg(target_os = "macos")]
        let program = "open";
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let program = "xdg-open";

        Command::new(program).arg(&abs).spawn()?;
        Ok(abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn frame() -> RgbImage {
        RgbImage::from_pixel(32, 24, image::Rgb([200, 30, 30]))
    }

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(evidence_file_name(&ts(8, 5, 7)), "alert_20240309_080507.jpg");
    }

    #[test]
    fn test_file_names_sort_chronologically() {
        let t0 = ts(9, 59, 58);
        let names: Vec<String> = (0..5)
            .map(|i| evidence_file_name(&(t0 + Duration::seconds(i * 37))))
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_open_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("detection_records");
        let store = EvidenceStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(store.records().is_empty());
    }

    #[test]
    fn test_save_recreates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(root.path().join("later"));
        assert!(!store.dir().exists());
        let record = store.save(&frame(), ts(11, 0, 0)).unwrap();
        assert!(record.path.is_file());
    }

    #[test]
    fn test_save_writes_jpeg() {
        let root = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(root.path()).unwrap();
        let record = store.save(&frame(), ts(10, 0, 1)).unwrap();

        assert_eq!(record.file_name(), "alert_20240309_100001.jpg");
        let decoded = image::open(&record.path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        assert_eq!(store.records(), vec![record.path]);
    }

    #[test]
    fn test_save_never_overwrites() {
        let root = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(root.path()).unwrap();
        let first = store.save(&frame(), ts(10, 0, 1)).unwrap();
        let before = fs::read(&first.path).unwrap();

        let other = RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0]));
        let err = store.save(&other, ts(10, 0, 1)).unwrap_err();
        assert!(matches!(err, MonitorError::EvidenceWriteFailure { .. }));
        assert_eq!(fs::read(&first.path).unwrap(), before);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_jpeg_reports_full_disk() {
        let full = File::options().write(true).open("/dev/full").unwrap();
        assert!(write_jpeg(&full, &frame()).is_err());
    }

    #[test]
    fn test_records_ignores_foreign_files() {
        let root = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(root.path()).unwrap();
        fs::write(root.path().join("notes.txt"), "x").unwrap();
        store.save(&frame(), ts(10, 0, 2)).unwrap();
        store.save(&frame(), ts(10, 0, 1)).unwrap();
        let names: Vec<String> = store
            .records()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["alert_20240309_100001.jpg", "alert_20240309_100002.jpg"]
        );
    }
}
