// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统数据结构定义
/// Data structures for the person detection system

// ========== 公共常量 ==========

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

/// COCO类别: 0=person
pub const PERSON_CLASS: u32 = 0;

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box), 原始帧像素坐标
#[derive(Clone, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

/// 单帧检测结果: 只保留 person 框
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detection {
    pub boxes: Vec<BBox>,
}

impl Detection {
    /// 从检测器的全部输出中挑出 person, 其它类别忽略
    pub fn from_boxes(all: Vec<BBox>) -> Self {
        Self {
            boxes: all.into_iter().filter(BBox::is_person).collect(),
        }
    }

    pub fn person_count(&self) -> usize {
        self.boxes.len()
    }
}
