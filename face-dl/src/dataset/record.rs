use crate::common::*;

/// Label file columns holding the five landmark coordinates. The visibility
/// flags in between are skipped.
pub const LANDMARK_COLUMNS: [usize; 10] = [4, 5, 7, 8, 10, 11, 13, 14, 16, 17];

/// One face line of the label file.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxLabel {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub landmarks: [[f32; 2]; NUM_LANDMARKS],
    pub landmark_valid: bool,
}

impl BoxLabel {
    /// The minimum number of values on a face line.
    pub const MIN_VALUES: usize = 4;

    /// Build a label from the values of a face line.
    ///
    /// Lines too short to carry landmark columns get zero landmarks marked invalid.
    pub fn from_values(values: &[f32]) -> Result<Self> {
        ensure!(
            values.len() >= Self::MIN_VALUES,
            "expect at least {} values, but get {}",
            Self::MIN_VALUES,
            values.len()
        );
        let [x, y, w, h] = [values[0], values[1], values[2], values[3]];

        let has_landmarks = values.len() > LANDMARK_COLUMNS[LANDMARK_COLUMNS.len() - 1];
        let (landmarks, landmark_valid) = if has_landmarks {
            let mut landmarks = [[0f32; 2]; NUM_LANDMARKS];
            LANDMARK_COLUMNS
                .chunks(2)
                .zip(landmarks.iter_mut())
                .for_each(|(columns, point)| {
                    *point = [values[columns[0]], values[columns[1]]];
                });
            let valid = landmarks[0][0] >= 0.0;
            (landmarks, valid)
        } else {
            ([[0f32; 2]; NUM_LANDMARKS], false)
        };

        Ok(Self {
            x,
            y,
            w,
            h,
            landmarks,
            landmark_valid,
        })
    }

    /// Check whether the box has zero or negative extent.
    pub fn is_degenerate(&self) -> bool {
        !(self.w > 0.0 && self.h > 0.0)
    }

    /// The landmark presence flag, `-1` when landmarks are missing, `1` otherwise.
    pub fn flag(&self) -> i64 {
        if self.landmark_valid {
            1
        } else {
            -1
        }
    }

    /// Convert the `[x, y, w, h]` box into a corner-form face label in pixel units.
    pub fn to_face_label(&self) -> Result<FaceLabel<f32>> {
        let rect = TLBR::try_from_xywh([self.x, self.y, self.w, self.h])
            .with_context(|| format!("invalid box {:?}", self))?;
        let landmarks = self.landmarks.map(|[x, y]| Point::new(x, y));

        Ok(FaceLabel {
            rect,
            landmarks,
            landmark_valid: self.landmark_valid,
        })
    }
}

/// The record with image path and boxes, but without image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Face boxes in pixel units.
    pub boxes: Vec<BoxLabel>,
}

impl FileRecord {
    /// Decode the image and convert the boxes into face labels.
    pub fn load(&self) -> Result<DataRecord> {
        let image = image::open(&self.path)
            .with_context(|| format!("failed to decode image '{}'", self.path.display()))?
            .to_rgb8();
        let labels: Vec<_> = self
            .boxes
            .iter()
            .map(|label| label.to_face_label())
            .try_collect()?;

        Ok(DataRecord { image, labels })
    }
}

/// The record with image pixels and labels.
#[derive(Debug, Clone)]
pub struct DataRecord {
    pub image: RgbImage,
    /// Face labels in pixel units.
    pub labels: Vec<FaceLabel<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_face_line() {
        let values = [
            10.0, 20.0, 30.0, 40.0, 15.0, 25.0, 0.0, 35.0, 25.0, 0.0, 25.0, 35.0, 0.0, 17.0, 50.0,
            0.0, 33.0, 50.0, 0.0, 0.9,
        ];
        let label = BoxLabel::from_values(&values).unwrap();
        assert_eq!(label.landmarks[0], [15.0, 25.0]);
        assert_eq!(label.landmarks[4], [33.0, 50.0]);
        assert!(label.landmark_valid);
        assert_eq!(label.flag(), 1);

        let face = label.to_face_label().unwrap();
        assert_eq!(face.rect.xyxy(), [10.0, 20.0, 40.0, 60.0]);
        assert_eq!(
            face.landmarks_flat(),
            [15.0, 25.0, 35.0, 25.0, 25.0, 35.0, 17.0, 50.0, 33.0, 50.0]
        );
    }

    #[test]
    fn negative_landmark_marks_absence() {
        let values = [
            10.0, 10.0, 50.0, 50.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0,
            -1.0, -1.0, -1.0, -1.0, 1.0,
        ];
        let label = BoxLabel::from_values(&values).unwrap();
        assert!(!label.landmark_valid);
        assert_eq!(label.flag(), -1);
    }

    #[test]
    fn box_only_line_zero_fills_landmarks() {
        let label = BoxLabel::from_values(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(label.landmarks, [[0.0; 2]; NUM_LANDMARKS]);
        assert!(!label.landmark_valid);
    }

    #[test]
    fn reject_short_line() {
        assert!(BoxLabel::from_values(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn degenerate_boxes() {
        let label = BoxLabel::from_values(&[10.0, 10.0, 0.0, 40.0]).unwrap();
        assert!(label.is_degenerate());
        let label = BoxLabel::from_values(&[10.0, 10.0, 5.0, -1.0]).unwrap();
        assert!(label.is_degenerate());
        let label = BoxLabel::from_values(&[10.0, 10.0, 5.0, 1.0]).unwrap();
        assert!(!label.is_degenerate());
    }
}
