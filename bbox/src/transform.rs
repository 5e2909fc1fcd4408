use super::TLBR;
use crate::{common::*, HW};

/// Per-axis scaling followed by translation, `y' = y * sy + ty`, `x' = x * sx + tx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transform<T> {
    pub sy: T,
    pub sx: T,
    pub ty: T,
    pub tx: T,
}

impl<T> Transform<T>
where
    T: Copy + Num,
{
    pub fn identity() -> Self {
        Self {
            sy: T::one(),
            sx: T::one(),
            ty: T::zero(),
            tx: T::zero(),
        }
    }

    pub fn translate(ty: T, tx: T) -> Self {
        Self {
            ty,
            tx,
            ..Self::identity()
        }
    }

    pub fn scale(sy: T, sx: T) -> Self {
        Self {
            sy,
            sx,
            ..Self::identity()
        }
    }
}

impl<T> Transform<T>
where
    T: Copy + Num + Neg<Output = T>,
{
    /// Mirror the x axis of an image of the given width.
    pub fn hflip(width: T) -> Self {
        Self {
            sx: -T::one(),
            tx: width,
            ..Self::identity()
        }
    }
}

impl<T> Transform<T>
where
    T: Copy + Num + PartialOrd,
{
    /// Stretch an image of `src` size to `tgt` size.
    pub fn from_sizes_exact(src: &HW<T>, tgt: &HW<T>) -> Self {
        Self::scale(tgt.h() / src.h(), tgt.w() / src.w())
    }
}

impl<T> Mul<&TLBR<T>> for &Transform<T>
where
    T: Copy + Num + PartialOrd,
{
    type Output = TLBR<T>;

    fn mul(self, rhs: &TLBR<T>) -> Self::Output {
        rhs.transform(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Point, RectNum};

    #[test]
    fn resize_exact() {
        let src = HW::try_from_hw([80.0, 80.0]).unwrap();
        let tgt = HW::try_from_hw([20.0, 40.0]).unwrap();
        let transform = Transform::from_sizes_exact(&src, &tgt);
        let expect = Transform {
            sx: 0.5,
            sy: 0.25,
            tx: 0.0,
            ty: 0.0,
        };
        assert_eq!(transform, expect);
    }

    #[test]
    fn crop_then_scale() {
        let crop = Transform::translate(-10.0, -20.0);
        let scale = Transform::scale(0.5, 0.5);

        let rect = TLBR::from_xyxy([30.0, 20.0, 50.0, 40.0]);
        assert_eq!((&scale * &(&crop * &rect)).xyxy(), [5.0, 5.0, 15.0, 15.0]);

        let point = Point::new(40.0, 30.0);
        assert_eq!(&scale * &(&crop * &point), Point::new(10.0, 10.0));
    }

    #[test]
    fn hflip_twice_is_identity() {
        let flip = Transform::hflip(64.0);
        let rect = TLBR::from_xyxy([10.0, 5.0, 20.0, 15.0]);
        assert_eq!((&flip * &rect).xyxy(), [44.0, 5.0, 54.0, 15.0]);
        assert_eq!(&flip * &(&flip * &rect), rect);
    }
}
