use crate::{common::*, Transform};

/// A 2D point in `(x, y)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point<T> {
    pub x: T,
    pub y: T,
}

impl<T> Point<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

impl<T> Point<T>
where
    T: Copy + Num,
{
    pub fn transform(&self, transform: &Transform<T>) -> Self {
        Self {
            x: self.x * transform.sx + transform.tx,
            y: self.y * transform.sy + transform.ty,
        }
    }
}

impl<T> Point<T>
where
    T: Copy + PartialOrd,
{
    /// Clamp both coordinates into `[min, max]` per axis.
    pub fn clamp(&self, min: Point<T>, max: Point<T>) -> Self {
        let clamp = |value: T, lo: T, hi: T| {
            if value < lo {
                lo
            } else if value > hi {
                hi
            } else {
                value
            }
        };
        Self {
            x: clamp(self.x, min.x, max.x),
            y: clamp(self.y, min.y, max.y),
        }
    }
}

impl<T> Mul<&Point<T>> for &Transform<T>
where
    T: Copy + Num,
{
    type Output = Point<T>;

    fn mul(self, rhs: &Point<T>) -> Self::Output {
        rhs.transform(self)
    }
}
