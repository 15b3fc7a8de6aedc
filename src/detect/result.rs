/// Axis-aligned box in pixel coordinates (`x1 <= x2`, `y1 <= y2`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn from_corners(xa: i32, ya: i32, xb: i32, yb: i32) -> Self {
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// One candidate object reported by a detector for a single frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    /// Index into the configured class-name list.
    pub class_index: usize,
    /// Raw model confidence in `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_index: usize, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_index,
            confidence,
            bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalized() {
        let bbox = BoundingBox::from_corners(40, 30, 10, 5);
        assert_eq!(
            bbox,
            BoundingBox {
                x1: 10,
                y1: 5,
                x2: 40,
                y2: 30
            }
        );
        assert_eq!(bbox.width(), 30);
        assert_eq!(bbox.height(), 25);
    }
}
