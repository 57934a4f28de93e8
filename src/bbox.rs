use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug + Copy + Clone + PartialEq {}

/// Left-top-width-height, the canonical storage format of detections
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

/// Left-top-right-bottom, the corner pair
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// Center x-y, aspect ratio (width / height) and height; the Kalman measurement space
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Xyah;
impl BBoxFormat for Xyah {}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(transparent, bound = "")]
pub struct BBox<F: BBoxFormat>([f32; 4], #[serde(skip)] PhantomData<F>);

impl<F: BBoxFormat> From<BBox<F>> for [f32; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    // The caller vouches that the array is already in format `F`
    #[inline(always)]
    pub fn assigned(raw: [f32; 4]) -> Self {
        BBox(raw, PhantomData)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl BBox<Ltwh> {
    #[inline]
    pub fn ltwh(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self::assigned([left, top, width, height])
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (
            self.left() + self.width() / 2.0,
            self.top() + self.height() / 2.0,
        )
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }

    #[inline]
    pub fn as_xyah(&self) -> BBox<Xyah> {
        self.into()
    }

    /// Intersection over union, zero for disjoint or empty boxes
    pub fn iou(&self, other: &BBox<Ltwh>) -> f32 {
        let a = self.as_ltrb();
        let b = other.as_ltrb();

        let iw = (a.right().min(b.right()) - a.left().max(b.left())).max(0.0);
        let ih = (a.bottom().min(b.bottom()) - a.top().max(b.top())).max(0.0);
        let inter = iw * ih;
        let union = self.area() + other.area() - inter;

        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self::assigned([left, top, right, bottom])
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline]
    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        self.into()
    }
}

impl BBox<Xyah> {
    #[inline]
    pub fn xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        Self::assigned([cx, cy, aspect_ratio, height])
    }

    #[inline(always)]
    pub fn cx(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn cy(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn aspect_ratio(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }

    #[inline]
    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        self.into()
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }
}

impl<'a> From<&'a BBox<Ltwh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Ltwh>) -> Self {
        let [l, t, w, h] = v.0;

        BBox::ltrb(l, t, l + w, t + h)
    }
}

impl<'a> From<&'a BBox<Ltwh>> for BBox<Xyah> {
    #[inline]
    fn from(v: &'a BBox<Ltwh>) -> Self {
        let [l, t, w, h] = v.0;

        BBox::xyah(l + w / 2.0, t + h / 2.0, w / h, h)
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Ltwh> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        let [l, t, r, b] = v.0;

        BBox::ltwh(l, t, r - l, b - t)
    }
}

impl<'a> From<&'a BBox<Xyah>> for BBox<Ltwh> {
    #[inline]
    fn from(v: &'a BBox<Xyah>) -> Self {
        let [cx, cy, a, h] = v.0;
        let w = a * h;

        BBox::ltwh(cx - w / 2.0, cy - h / 2.0, w, h)
    }
}

impl<'a> From<&'a BBox<Xyah>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Xyah>) -> Self {
        let [cx, cy, a, h] = v.0;
        let hw = a * h / 2.0;

        BBox::ltrb(cx - hw, cy - h / 2.0, cx + hw, cy + h / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f32; 4], b: &[f32; 4]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn ltwh_conversions() {
        let b = BBox::ltwh(10.0, 20.0, 30.0, 60.0);

        assert_eq!(b.as_ltrb().as_slice(), &[10.0, 20.0, 40.0, 80.0]);
        assert_eq!(b.as_xyah().as_slice(), &[25.0, 50.0, 0.5, 60.0]);
        assert!(close(b.as_xyah().as_ltwh().as_slice(), b.as_slice()));
        assert!(close(b.as_xyah().as_ltrb().as_slice(), b.as_ltrb().as_slice()));
        assert!(close(b.as_ltrb().as_ltwh().as_slice(), b.as_slice()));
    }

    #[test]
    fn iou_overlap_and_disjoint() {
        let a = BBox::ltwh(0.0, 0.0, 10.0, 10.0);
        let b = BBox::ltwh(5.0, 0.0, 10.0, 10.0);
        let c = BBox::ltwh(100.0, 100.0, 10.0, 10.0);

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&c), 0.0);
        assert_eq!(a.iou(&BBox::ltwh(0.0, 0.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn serializes_as_plain_array() {
        let b = BBox::ltwh(1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[1.0,2.0,3.0,4.0]");

        let back: BBox<Ltwh> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }
}
