use super::{Rect, TLBR};
use crate::common::*;

/// Bounding box in CyCxHW format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CyCxHW<T> {
    pub(crate) cy: T,
    pub(crate) cx: T,
    pub(crate) h: T,
    pub(crate) w: T,
}

impl<T> CyCxHW<T>
where
    T: Copy + Num + PartialOrd,
{
    /// Build a box from center and size without validation.
    ///
    /// Anchor tables use it for geometry that is positive by construction.
    pub fn from_cycxhw_unchecked(cycxhw: [T; 4]) -> Self {
        let [cy, cx, h, w] = cycxhw;
        Self { cy, cx, h, w }
    }
}

impl<T> CyCxHW<T>
where
    T: Float,
{
    /// Clamp center and size into the `[0, 1]` range.
    pub fn clamp_unit(&self) -> Self {
        let zero = T::zero();
        let one = T::one();
        let clamp = |value: T| value.max(zero).min(one);
        Self {
            cy: clamp(self.cy),
            cx: clamp(self.cx),
            h: clamp(self.h),
            w: clamp(self.w),
        }
    }
}

impl<T> Rect for CyCxHW<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn t(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.cy - self.h / two
    }

    fn l(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.cx - self.w / two
    }

    fn b(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.cy + self.h / two
    }

    fn r(&self) -> Self::Type {
        let two = T::one() + T::one();
        self.cx + self.w / two
    }

    fn cy(&self) -> Self::Type {
        self.cy
    }

    fn cx(&self) -> Self::Type {
        self.cx
    }

    fn h(&self) -> Self::Type {
        self.h
    }

    fn w(&self) -> Self::Type {
        self.w
    }

    fn try_from_tlbr(tlbr: [T; 4]) -> Result<Self> {
        let [t, l, b, r] = tlbr;
        let zero = T::zero();
        let two = T::one() + T::one();
        let h = b - t;
        let w = r - l;
        ensure!(
            h >= zero && w >= zero,
            "box height and width must be non-negative"
        );
        let cy = t + h / two;
        let cx = l + w / two;

        Ok(Self { cy, cx, h, w })
    }

    fn try_from_tlhw(tlhw: [T; 4]) -> Result<Self> {
        let [t, l, h, w] = tlhw;
        let zero = T::zero();
        let two = T::one() + T::one();
        ensure!(
            h >= zero && w >= zero,
            "box height and width must be non-negative"
        );

        let cy = t + h / two;
        let cx = l + w / two;

        Ok(Self { cy, cx, h, w })
    }

    fn try_from_cycxhw(cycxhw: [T; 4]) -> Result<Self> {
        let [cy, cx, h, w] = cycxhw;
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            "box height and width must be non-negative"
        );

        Ok(Self { cy, cx, h, w })
    }
}

impl<T> From<TLBR<T>> for CyCxHW<T>
where
    T: Copy + Num,
{
    fn from(from: TLBR<T>) -> Self {
        Self::from(&from)
    }
}

impl<T> From<&TLBR<T>> for CyCxHW<T>
where
    T: Copy + Num,
{
    fn from(from: &TLBR<T>) -> Self {
        let two = T::one() + T::one();
        let TLBR { t, l, b, r } = *from;
        let h = b - t;
        let w = r - l;
        let cy = t + h / two;
        let cx = l + w / two;
        Self { cy, cx, h, w }
    }
}
