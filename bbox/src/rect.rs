use super::{CyCxHW, TLBR};
use crate::common::*;

/// The generic rectangle.
pub trait Rect {
    type Type;

    fn t(&self) -> Self::Type;
    fn l(&self) -> Self::Type;
    fn b(&self) -> Self::Type;
    fn r(&self) -> Self::Type;
    fn cy(&self) -> Self::Type;
    fn cx(&self) -> Self::Type;
    fn h(&self) -> Self::Type;
    fn w(&self) -> Self::Type;

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;

    fn try_from_tlhw(tlhw: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;

    fn try_from_cycxhw(cycxhw: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Num + PartialOrd,
{
    fn cycxhw(&self) -> [Self::Type; 4] {
        [self.cy(), self.cx(), self.h(), self.w()]
    }

    fn tlbr(&self) -> [Self::Type; 4] {
        [self.t(), self.l(), self.b(), self.r()]
    }

    fn tlhw(&self) -> [Self::Type; 4] {
        [self.t(), self.l(), self.h(), self.w()]
    }

    /// Corners in `[x1, y1, x2, y2]` order.
    fn xyxy(&self) -> [Self::Type; 4] {
        [self.l(), self.t(), self.r(), self.b()]
    }

    fn hw(&self) -> [Self::Type; 2] {
        [self.h(), self.w()]
    }

    fn to_cycxhw(&self) -> CyCxHW<Self::Type> {
        CyCxHW {
            cy: self.cy(),
            cx: self.cx(),
            h: self.h(),
            w: self.w(),
        }
    }

    fn to_tlbr(&self) -> TLBR<Self::Type> {
        TLBR {
            t: self.t(),
            l: self.l(),
            b: self.b(),
            r: self.r(),
        }
    }

    fn area(&self) -> Self::Type {
        self.h() * self.w()
    }

    /// Check if the point lies strictly inside the rectangle.
    fn contains_point(&self, y: Self::Type, x: Self::Type) -> bool {
        self.t() < y && y < self.b() && self.l() < x && x < self.r()
    }
}

pub trait RectFloat: RectNum
where
    Self::Type: Float,
{
    fn intersect_with<R>(&self, other: &R) -> Option<TLBR<Self::Type>>
    where
        R: Rect<Type = Self::Type>,
    {
        let t = self.t().max(other.t());
        let l = self.l().max(other.l());
        let b = self.b().min(other.b());
        let r = self.r().min(other.r());
        (b > t && r > l).then(|| TLBR { t, l, b, r })
    }

    fn intersection_area_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        self.intersect_with(other)
            .map(|rect| rect.area())
            .unwrap_or_else(Self::Type::zero)
    }

    /// Intersection over union. Returns zero when the union is empty.
    fn iou_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        let zero = Self::Type::zero();
        let inter_area = self.intersection_area_with(other);
        let union_area = self.area() + other.h() * other.w() - inter_area;
        if union_area <= zero {
            zero
        } else {
            inter_area / union_area
        }
    }

    /// Intersection over the area of `self`, the foreground box.
    fn iof_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        let zero = Self::Type::zero();
        let area = self.area();
        if area <= zero {
            zero
        } else {
            self.intersection_area_with(other) / area
        }
    }

    /// Clamp the rectangle into the `bound` rectangle.
    fn clamp_to<R>(&self, bound: &R) -> TLBR<Self::Type>
    where
        R: Rect<Type = Self::Type>,
    {
        let clamp = |value: Self::Type, min: Self::Type, max: Self::Type| value.max(min).min(max);
        let t = clamp(self.t(), bound.t(), bound.b());
        let l = clamp(self.l(), bound.l(), bound.r());
        let b = clamp(self.b(), bound.t(), bound.b());
        let r = clamp(self.r(), bound.l(), bound.r());
        TLBR { t, l, b, r }
    }
}

impl<T> RectNum for T
where
    T: Rect,
    T::Type: Num + PartialOrd,
{
}

impl<T> RectFloat for T
where
    T: Rect,
    T::Type: Float,
{
}
