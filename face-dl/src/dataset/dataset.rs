use super::*;
use crate::common::*;

/// The dataset with a list of image paths and boxes.
pub trait FileDataset
where
    Self: Debug + Send + Sync,
{
    /// Get the list of records in the dataset.
    fn records(&self) -> &[Arc<FileRecord>];
}

/// The dataset that can be random accessed.
pub trait RandomAccessDataset
where
    Self: Debug + Send + Sync,
{
    /// Get number of records in the dataset.
    fn num_records(&self) -> usize;

    /// Load the nth record in the dataset.
    ///
    /// Failing to decode the image fails this record only.
    fn nth(&self, index: usize) -> Result<DataRecord>;
}
