use super::*;
use crate::common::*;

/// The image list and face labels of a WIDER FACE style label file.
///
/// The label file is a flat text file. A line `# <relative-image-path>` starts
/// an image record and each following line lists one face as
/// whitespace-separated values `x y w h [l1x l1y v1 ... l5x l5y v5 ...]`.
#[derive(Debug, Clone)]
pub struct WiderFaceDataset {
    image_dir: PathBuf,
    records: Vec<Arc<FileRecord>>,
}

impl WiderFaceDataset {
    /// Load the dataset. Images are looked up in the `images` directory next
    /// to the label file.
    pub fn open(label_file: impl AsRef<Path>) -> Result<Self> {
        let label_file = label_file.as_ref();
        let image_dir = label_file
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join("images");
        Self::open_with_image_dir(label_file, image_dir)
    }

    /// Load the dataset with an explicit image directory.
    pub fn open_with_image_dir(
        label_file: impl AsRef<Path>,
        image_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let label_file = label_file.as_ref();
        let image_dir = image_dir.as_ref();

        let text = fs::read_to_string(label_file)
            .with_context(|| format!("failed to read label file '{}'", label_file.display()))?;
        let entries = parse_labels(&text)
            .with_context(|| format!("failed to parse label file '{}'", label_file.display()))?;

        // check existence of image files
        let entries: Vec<_> = entries
            .into_iter()
            .map(|(path, boxes)| {
                let image_file = image_dir.join(&path);
                ensure!(
                    image_file.is_file(),
                    "the image file '{}' does not exist",
                    image_file.display()
                );
                Ok((image_file, boxes))
            })
            .try_collect()?;

        let records = sanitize(entries);
        info!(
            "loaded {} images from '{}'",
            records.len(),
            label_file.display()
        );

        Ok(Self {
            image_dir: image_dir.to_owned(),
            records,
        })
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FileDataset for WiderFaceDataset {
    fn records(&self) -> &[Arc<FileRecord>] {
        &self.records
    }
}

impl RandomAccessDataset for WiderFaceDataset {
    fn num_records(&self) -> usize {
        self.records.len()
    }

    fn nth(&self, index: usize) -> Result<DataRecord> {
        let record = self.records.get(index).ok_or_else(|| {
            format_err!(
                "index {} out of range of {} records",
                index,
                self.records.len()
            )
        })?;
        record.load()
    }
}

/// Parse the label file text into `(relative path, boxes)` pairs in file order.
///
/// Records are returned as written, degenerate boxes and empty records
/// included.
pub fn parse_labels(text: &str) -> Result<Vec<(String, Vec<BoxLabel>)>> {
    let mut entries = vec![];
    let mut current: Option<(String, Vec<BoxLabel>)> = None;

    for (line_index, line) in text.lines().enumerate() {
        let line_no = line_index + 1;
        let line = line.trim_end();

        if let Some(path) = line.strip_prefix('#') {
            // the first header closes nothing
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some((path.trim_start().to_owned(), vec![]));
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        let (_, boxes) = current
            .as_mut()
            .ok_or_else(|| format_err!("line {}: face line before any image header", line_no))?;
        let values: Vec<f32> = line
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f32>()
                    .with_context(|| format!("line {}: invalid value '{}'", line_no, token))
            })
            .try_collect()?;
        let label =
            BoxLabel::from_values(&values).with_context(|| format!("line {}", line_no))?;
        boxes.push(label);
    }

    // flush the last record
    entries.extend(current);

    Ok(entries)
}

/// Drop degenerate boxes, then drop images left without boxes.
fn sanitize(entries: Vec<(PathBuf, Vec<BoxLabel>)>) -> Vec<Arc<FileRecord>> {
    let mut num_dropped_boxes = 0;
    let mut num_dropped_images = 0;

    let records: Vec<_> = entries
        .into_iter()
        .filter_map(|(path, boxes)| {
            let num_boxes = boxes.len();
            let boxes: Vec<_> = boxes
                .into_iter()
                .filter(|label| !label.is_degenerate())
                .collect();
            num_dropped_boxes += num_boxes - boxes.len();

            if boxes.is_empty() {
                num_dropped_images += 1;
                return None;
            }
            Some(Arc::new(FileRecord { path, boxes }))
        })
        .collect();

    if num_dropped_boxes > 0 {
        warn!(
            "dropped {} zero-area boxes and {} images left without boxes",
            num_dropped_boxes, num_dropped_images
        );
    }

    records
}
