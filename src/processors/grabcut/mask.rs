//! Per-pixel segmentation labels.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

/// Label of a single mask pixel. The numeric values follow the usual GrabCut
/// convention so a mask can be dumped as an 8-bit image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MaskLabel {
    /// Definitely background; never relabeled by a cut.
    Background = 0,
    /// Definitely foreground; never relabeled by a cut.
    Foreground = 1,
    /// Probably background.
    ProbableBackground = 2,
    /// Probably foreground.
    ProbableForeground = 3,
}

impl MaskLabel {
    /// Decodes a stored value; anything outside 0..=3 reads as background.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MaskLabel::Foreground,
            2 => MaskLabel::ProbableBackground,
            3 => MaskLabel::ProbableForeground,
            _ => MaskLabel::Background,
        }
    }

    /// Definite or probable foreground.
    pub fn is_foreground(self) -> bool {
        matches!(self, MaskLabel::Foreground | MaskLabel::ProbableForeground)
    }

    /// Probable labels are the only ones a cut may change.
    pub fn is_probable(self) -> bool {
        matches!(
            self,
            MaskLabel::ProbableBackground | MaskLabel::ProbableForeground
        )
    }
}

/// Axis-aligned rectangle in pixel coordinates, allowed to be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CutRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle has area and lies inside a `width`×`height` image.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.saturating_add(self.width) <= width
            && self.y.saturating_add(self.height) <= height
    }

    /// Whether `(x, y)` lies inside the rectangle.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }

    fn to_rect(self) -> Option<Rect> {
        (self.width > 0 && self.height > 0)
            .then(|| Rect::at(self.x as i32, self.y as i32).of_size(self.width, self.height))
    }
}

/// A label per pixel, backed by an 8-bit image.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    labels: GrayImage,
}

impl SegmentationMask {
    /// A mask of the given size filled with `label`.
    pub fn new(width: u32, height: u32, label: MaskLabel) -> Self {
        Self {
            labels: GrayImage::from_pixel(width, height, Luma([label as u8])),
        }
    }

    pub fn width(&self) -> u32 {
        self.labels.width()
    }

    pub fn height(&self) -> u32 {
        self.labels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.labels.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> MaskLabel {
        MaskLabel::from_u8(self.labels.get_pixel(x, y)[0])
    }

    pub fn set(&mut self, x: u32, y: u32, label: MaskLabel) {
        self.labels.put_pixel(x, y, Luma([label as u8]));
    }

    /// Labels in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = MaskLabel> + '_ {
        self.labels.as_raw().iter().map(|&v| MaskLabel::from_u8(v))
    }

    /// Number of definite or probable foreground pixels.
    pub fn foreground_count(&self) -> usize {
        self.iter().filter(|l| l.is_foreground()).count()
    }

    /// Fills `rect`, clipped to the mask. Empty rectangles are a no-op.
    pub fn fill_rect(&mut self, rect: CutRect, label: MaskLabel) {
        if let Some(rect) = rect.to_rect() {
            draw_filled_rect_mut(&mut self.labels, rect, Luma([label as u8]));
        }
    }

    /// Draws the outline of `rect` with a stroke `thickness` pixels wide, centered
    /// on the rectangle's edges and clipped to the mask.
    pub fn stroke_rect(&mut self, rect: CutRect, thickness: u32, label: MaskLabel) {
        let t = thickness.max(1) as i32;
        let half = t / 2;
        let left = rect.x as i32 - half;
        let top = rect.y as i32 - half;
        let right = (rect.x + rect.width) as i32 - half;
        let bottom = (rect.y + rect.height) as i32 - half;
        let span_w = (right - left + t) as u32;
        let span_h = (bottom - top + t) as u32;
        let value = Luma([label as u8]);

        for band in [
            Rect::at(left, top).of_size(span_w, t as u32),
            Rect::at(left, bottom).of_size(span_w, t as u32),
            Rect::at(left, top).of_size(t as u32, span_h),
            Rect::at(right, top).of_size(t as u32, span_h),
        ] {
            draw_filled_rect_mut(&mut self.labels, band, value);
        }
    }

    /// Keeps foreground pixels of `img` and paints the rest with `sentinel`.
    pub fn composite(&self, img: &RgbImage, sentinel: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(img.width(), img.height(), |x, y| {
            if self.get(x, y).is_foreground() {
                *img.get_pixel(x, y)
            } else {
                Rgb(sentinel)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_count() {
        let mut mask = SegmentationMask::new(10, 10, MaskLabel::Background);
        mask.fill_rect(CutRect::new(2, 2, 3, 4), MaskLabel::ProbableForeground);
        assert_eq!(mask.foreground_count(), 12);
        assert_eq!(mask.get(2, 2), MaskLabel::ProbableForeground);
        assert_eq!(mask.get(5, 2), MaskLabel::Background);
        mask.fill_rect(CutRect::new(0, 0, 0, 5), MaskLabel::Foreground);
        assert_eq!(mask.foreground_count(), 12);
    }

    #[test]
    fn test_stroke_leaves_interior() {
        let mut mask = SegmentationMask::new(20, 20, MaskLabel::Foreground);
        mask.stroke_rect(CutRect::new(4, 4, 12, 12), 2, MaskLabel::ProbableBackground);
        assert_eq!(mask.get(4, 4), MaskLabel::ProbableBackground);
        assert_eq!(mask.get(3, 10), MaskLabel::ProbableBackground);
        assert_eq!(mask.get(15, 10), MaskLabel::ProbableBackground);
        assert_eq!(mask.get(10, 10), MaskLabel::Foreground);
        assert_eq!(mask.get(0, 0), MaskLabel::Foreground);
    }

    #[test]
    fn test_thick_stroke_clips_to_mask() {
        let mut mask = SegmentationMask::new(16, 16, MaskLabel::Foreground);
        mask.stroke_rect(CutRect::new(7, 7, 2, 2), 40, MaskLabel::ProbableBackground);
        assert_eq!(mask.foreground_count(), 0);
    }

    #[test]
    fn test_composite_uses_sentinel() {
        let img = RgbImage::from_pixel(2, 1, Rgb([9, 9, 9]));
        let mut mask = SegmentationMask::new(2, 1, MaskLabel::ProbableBackground);
        mask.set(0, 0, MaskLabel::ProbableForeground);
        let out = mask.composite(&img, [0, 0, 255]);
        assert_eq!(out.get_pixel(0, 0), &Rgb([9, 9, 9]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_rect_fits() {
        assert!(CutRect::new(1, 1, 8, 8).fits(10, 10));
        assert!(!CutRect::new(3, 3, 8, 8).fits(10, 10));
        assert!(!CutRect::new(0, 0, 0, 8).fits(10, 10));
        assert!(CutRect::new(1, 1, 2, 2).contains(2, 2));
        assert!(!CutRect::new(1, 1, 2, 2).contains(3, 1));
    }
}
