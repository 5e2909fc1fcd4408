//! Face labels: a bounding box with five facial landmarks.

use bbox::{Point, Transform, TLBR};
use num_traits::Float;
use std::ops::Mul;

/// Number of facial landmarks per face.
pub const NUM_LANDMARKS: usize = 5;

/// Landmark pairs exchanged by a horizontal mirror: the eyes and the mouth corners.
///
/// The landmark order is left eye, right eye, nose tip, left mouth corner,
/// right mouth corner.
pub const MIRROR_PAIRS: [(usize, usize); 2] = [(0, 1), (3, 4)];

/// A face annotation in arbitrary units.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLabel<T> {
    pub rect: TLBR<T>,
    pub landmarks: [Point<T>; NUM_LANDMARKS],
    /// Whether the landmarks are annotated.
    pub landmark_valid: bool,
}

impl<T> FaceLabel<T>
where
    T: Float,
{
    /// Label a face without landmarks.
    pub fn without_landmarks(rect: TLBR<T>) -> Self {
        let zero = T::zero();
        Self {
            rect,
            landmarks: [Point::new(zero, zero); NUM_LANDMARKS],
            landmark_valid: false,
        }
    }

    /// The landmark presence flag, `1` when landmarks are valid and `-1` otherwise.
    pub fn flag(&self) -> T {
        if self.landmark_valid {
            T::one()
        } else {
            -T::one()
        }
    }

    /// Landmarks flattened in `[x1, y1, ..., x5, y5]` order.
    pub fn landmarks_flat(&self) -> [T; 2 * NUM_LANDMARKS] {
        let mut flat = [T::zero(); 2 * NUM_LANDMARKS];
        self.landmarks.iter().enumerate().for_each(|(index, point)| {
            flat[index * 2] = point.x;
            flat[index * 2 + 1] = point.y;
        });
        flat
    }

    pub fn transform(&self, transform: &Transform<T>) -> Self {
        Self {
            rect: transform * &self.rect,
            landmarks: self.landmarks.map(|point| transform * &point),
            landmark_valid: self.landmark_valid,
        }
    }

    /// Mirror the label horizontally in an image of the given width.
    ///
    /// Besides negating x coordinates, left and right landmarks swap places so
    /// that the left eye stays the left eye of the mirrored face.
    pub fn mirror(&self, width: T) -> Self {
        let mut output = self.transform(&Transform::hflip(width));
        MIRROR_PAIRS.iter().for_each(|&(lhs, rhs)| {
            output.landmarks.swap(lhs, rhs);
        });
        output
    }
}

impl<'a, T> Mul<&'a FaceLabel<T>> for &'a Transform<T>
where
    T: Float,
{
    type Output = FaceLabel<T>;

    fn mul(self, rhs: &'a FaceLabel<T>) -> Self::Output {
        rhs.transform(self)
    }
}
