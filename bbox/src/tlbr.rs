use super::{CyCxHW, Rect};
use crate::{common::*, Transform};

/// Bounding box in TLBR format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TLBR<T> {
    pub(crate) t: T,
    pub(crate) l: T,
    pub(crate) b: T,
    pub(crate) r: T,
}

impl<T> TLBR<T>
where
    T: Copy + Num + PartialOrd,
{
    /// Build a box from `[x1, y1, x2, y2]` corners.
    pub fn try_from_xyxy(xyxy: [T; 4]) -> Result<Self> {
        let [l, t, r, b] = xyxy;
        Self::try_from_tlbr([t, l, b, r])
    }

    pub fn from_xyxy(xyxy: [T; 4]) -> Self {
        let [l, t, r, b] = xyxy;
        Self { t, l, b, r }
    }

    /// Build a box from the top-left corner and the size, `[x, y, w, h]`.
    pub fn try_from_xywh(xywh: [T; 4]) -> Result<Self> {
        let [x, y, w, h] = xywh;
        Self::try_from_tlhw([y, x, h, w])
    }

    /// Apply the transform. Corners are reordered if an axis is mirrored.
    pub fn transform(&self, transform: &Transform<T>) -> Self {
        let y1 = self.t * transform.sy + transform.ty;
        let y2 = self.b * transform.sy + transform.ty;
        let x1 = self.l * transform.sx + transform.tx;
        let x2 = self.r * transform.sx + transform.tx;
        let (t, b) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        let (l, r) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        Self { t, l, b, r }
    }
}

impl<T> Rect for TLBR<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn t(&self) -> Self::Type {
        self.t
    }

    fn l(&self) -> Self::Type {
        self.l
    }

    fn b(&self) -> Self::Type {
        self.b
    }

    fn r(&self) -> Self::Type {
        self.r
    }

    fn cy(&self) -> Self::Type {
        let two = T::one() + T::one();
        (self.t + self.b) / two
    }

    fn cx(&self) -> Self::Type {
        let two = T::one() + T::one();
        (self.l + self.r) / two
    }

    fn h(&self) -> Self::Type {
        self.b - self.t
    }

    fn w(&self) -> Self::Type {
        self.r - self.l
    }

    fn try_from_cycxhw(cycxhw: [Self::Type; 4]) -> Result<Self> {
        let [cy, cx, h, w] = cycxhw;
        let zero = T::zero();
        ensure!(h >= zero && w >= zero, "h and w must be non-negative");

        let two = T::one() + T::one();
        let t = cy - h / two;
        let b = cy + h / two;
        let l = cx - w / two;
        let r = cx + w / two;

        Ok(Self { t, l, b, r })
    }

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self> {
        let [t, l, b, r] = tlbr;
        ensure!(b >= t && r >= l, "b >= t and r >= l must hold");

        Ok(Self { t, l, b, r })
    }

    fn try_from_tlhw(tlhw: [Self::Type; 4]) -> Result<Self> {
        let [t, l, h, w] = tlhw;
        let b = t + h;
        let r = l + w;
        Self::try_from_tlbr([t, l, b, r])
    }
}

impl<T> From<CyCxHW<T>> for TLBR<T>
where
    T: Copy + Num,
{
    fn from(from: CyCxHW<T>) -> Self {
        Self::from(&from)
    }
}

impl<T> From<&CyCxHW<T>> for TLBR<T>
where
    T: Copy + Num,
{
    fn from(from: &CyCxHW<T>) -> Self {
        let two = T::one() + T::one();
        let CyCxHW { cy, cx, h, w } = *from;
        let t = cy - h / two;
        let l = cx - w / two;
        let b = cy + h / two;
        let r = cx + w / two;
        Self { t, l, b, r }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RectNum;

    #[test]
    fn xywh_to_corners() {
        let rect = TLBR::try_from_xywh([10.0, 20.0, 50.0, 40.0]).unwrap();
        assert_eq!(rect.xyxy(), [10.0, 20.0, 60.0, 60.0]);
        assert_eq!(rect.hw(), [40.0, 50.0]);
    }

    #[test]
    fn reject_inverted_corners() {
        assert!(TLBR::try_from_xyxy([5.0, 0.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn mirrored_transform_keeps_order() {
        let rect = TLBR::from_xyxy([1.0, 2.0, 3.0, 4.0]);
        let flipped = rect.transform(&Transform::hflip(10.0));
        assert_eq!(flipped.xyxy(), [7.0, 2.0, 9.0, 4.0]);
    }
}
