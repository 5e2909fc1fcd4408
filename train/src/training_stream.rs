use crate::{
    common::*,
    config::{DistributedConfig, SampleErrorPolicy},
};

/// Options of the training data stream.
#[derive(Debug, Clone)]
pub struct TrainingStreamInit {
    pub batch_size: usize,
    pub num_epochs: usize,
    pub seed: u64,
    /// The number of samples loaded concurrently.
    pub num_workers: usize,
    pub shuffle: bool,
    pub distributed: Option<DistributedConfig>,
    pub on_sample_error: SampleErrorPolicy,
}

impl TrainingStreamInit {
    pub fn build(
        self,
        dataset: Arc<dyn RandomAccessDataset>,
        preprocessor: Arc<Preprocessor>,
        encoder: Arc<TargetEncoder>,
    ) -> Result<TrainingStream> {
        let Self {
            batch_size,
            num_epochs,
            seed,
            num_workers,
            shuffle,
            distributed,
            on_sample_error,
        } = self;

        ensure!(batch_size > 0, "batch_size must be positive");
        ensure!(num_workers > 0, "num_workers must be positive");
        if let Some(DistributedConfig {
            shard_id,
            num_shards,
        }) = distributed
        {
            ensure!(
                shard_id < num_shards.get(),
                "shard_id {} is out of range of {} shards",
                shard_id,
                num_shards
            );
        }
        ensure!(
            preprocessor.image_size() == encoder.anchors().image_size(),
            "the preprocessor outputs {}px images, but the anchors are laid out for {}px",
            preprocessor.image_size(),
            encoder.anchors().image_size()
        );

        Ok(TrainingStream {
            batch_size,
            num_epochs,
            seed,
            num_workers,
            shuffle,
            distributed,
            on_sample_error,
            dataset,
            preprocessor,
            encoder,
        })
    }
}

/// Asynchronous data stream for training.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TrainingStream {
    batch_size: usize,
    num_epochs: usize,
    seed: u64,
    num_workers: usize,
    shuffle: bool,
    distributed: Option<DistributedConfig>,
    on_sample_error: SampleErrorPolicy,
    dataset: Arc<dyn RandomAccessDataset>,
    #[derivative(Debug = "ignore")]
    preprocessor: Arc<Preprocessor>,
    #[derivative(Debug = "ignore")]
    encoder: Arc<TargetEncoder>,
}

impl TrainingStream {
    pub fn num_anchors(&self) -> usize {
        self.encoder.num_anchors()
    }

    /// The number of records this shard visits in one epoch.
    pub fn num_samples_per_epoch(&self) -> usize {
        shard_len(self.dataset.num_records(), self.distributed)
    }

    /// The number of complete batches in one epoch, assuming no sample is skipped.
    pub fn num_batches_per_epoch(&self) -> usize {
        self.num_samples_per_epoch() / self.batch_size
    }

    pub fn train_stream(&self) -> BoxStream<'static, Result<TrainingBatch>> {
        let Self {
            batch_size,
            num_epochs,
            seed,
            num_workers,
            shuffle,
            distributed,
            on_sample_error,
            ..
        } = *self;
        let num_records = self.dataset.num_records();

        // epoch and record index pairs
        let stream = stream::iter(0..num_epochs).flat_map(move |epoch| {
            let indices = epoch_indices(num_records, epoch, seed, shuffle, distributed);
            stream::iter(indices.into_iter().map(move |index| (epoch, index)))
        });

        // load, augment and encode samples in parallel, keeping the order
        let stream = {
            let dataset = self.dataset.clone();
            let preprocessor = self.preprocessor.clone();
            let encoder = self.encoder.clone();

            stream
                .map(move |(epoch, index)| {
                    let dataset = dataset.clone();
                    let preprocessor = preprocessor.clone();
                    let encoder = encoder.clone();

                    tokio::task::spawn_blocking(move || {
                        let mut rng = sample_rng(seed, epoch, index);
                        let result =
                            load_sample(&*dataset, &preprocessor, &encoder, index, &mut rng);
                        (epoch, index, result)
                    })
                })
                .buffered(num_workers)
        };

        // apply the sample error policy
        let stream = stream.filter_map(move |result| {
            let output = match result {
                Ok((epoch, _index, Ok(sample))) => Some(Ok((epoch, sample))),
                Ok((_epoch, index, Err(err))) => match on_sample_error {
                    SampleErrorPolicy::Abort => Some(Err(err)),
                    SampleErrorPolicy::Skip => {
                        warn!("skip sample {}: {:#}", index, err);
                        None
                    }
                },
                Err(err) => Some(Err(Error::from(err))),
            };
            future::ready(output)
        });

        // group samples into batches within each epoch
        let stream = stream
            .scan(None, move |pending: &mut Option<(usize, Vec<TrainingSample>)>, result| {
                let output = match result {
                    Ok((epoch, sample)) => {
                        if matches!(*pending, Some((pending_epoch, _)) if pending_epoch != epoch) {
                            // an unfinished batch of the previous epoch is dropped
                            *pending = None;
                        }
                        let (_, batch) = pending.get_or_insert_with(|| (epoch, vec![]));
                        batch.push(sample);

                        if batch.len() == batch_size {
                            pending.take().map(Ok)
                        } else {
                            None
                        }
                    }
                    Err(err) => Some(Err(err)),
                };
                future::ready(Some(output))
            })
            .filter_map(future::ready);

        // add step count and collate
        let stream = stream
            .enumerate()
            .map(|(step, result)| {
                let (epoch, samples) = result?;
                TrainingBatch::collate(epoch, step, samples)
            });

        stream.boxed()
    }
}

/// The record indices visited by one shard in one epoch.
///
/// Indices are shuffled by a generator seeded with `seed + epoch`, so every
/// shard sees the same permutation. Shard `k` of `n` takes every `n`-th index
/// starting at `k`, truncated to `num_records / n` indices so that all shards
/// have equal length.
pub fn epoch_indices(
    num_records: usize,
    epoch: usize,
    seed: u64,
    shuffle: bool,
    distributed: Option<DistributedConfig>,
) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..num_records).collect();
    if shuffle {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
        indices.shuffle(&mut rng);
    }

    match distributed {
        Some(DistributedConfig {
            shard_id,
            num_shards,
        }) => indices
            .into_iter()
            .skip(shard_id)
            .step_by(num_shards.get())
            .take(shard_len(num_records, distributed))
            .collect(),
        None => indices,
    }
}

fn shard_len(num_records: usize, distributed: Option<DistributedConfig>) -> usize {
    match distributed {
        Some(DistributedConfig { num_shards, .. }) => num_records / num_shards.get(),
        None => num_records,
    }
}

/// One preprocessed and encoded sample.
#[derive(Debug)]
struct TrainingSample {
    index: usize,
    image: Tensor,
    loc: Tensor,
    conf: Tensor,
    landm: Tensor,
}

fn load_sample(
    dataset: &dyn RandomAccessDataset,
    preprocessor: &Preprocessor,
    encoder: &TargetEncoder,
    index: usize,
    rng: &mut StdRng,
) -> Result<TrainingSample> {
    let record = dataset
        .nth(index)
        .with_context(|| format!("failed to load record {}", index))?;
    let sample = preprocessor
        .forward(record, rng)
        .with_context(|| format!("failed to preprocess record {}", index))?;
    let target = encoder.encode(&sample.labels);
    let (loc, conf, landm) = target.to_tensors();

    Ok(TrainingSample {
        index,
        image: sample.image,
        loc,
        conf,
        landm,
    })
}

/// A batch of network inputs and encoded targets.
#[derive(Debug, TensorLike)]
pub struct TrainingBatch {
    pub epoch: usize,
    pub step: usize,
    /// Images in shape `[B, 3, S, S]`.
    pub image: Tensor,
    /// Encoded box offsets in shape `[B, A, 4]`.
    pub loc: Tensor,
    /// Anchor labels in shape `[B, A]`.
    pub conf: Tensor,
    /// Encoded landmark offsets in shape `[B, A, 10]`.
    pub landm: Tensor,
    /// The record index of each sample.
    #[tensor_like(clone)]
    pub indices: Vec<usize>,
}

impl TrainingBatch {
    fn collate(epoch: usize, step: usize, samples: Vec<TrainingSample>) -> Result<Self> {
        ensure!(!samples.is_empty(), "cannot collate an empty batch");

        let indices: Vec<_> = samples.iter().map(|sample| sample.index).collect();
        let images: Vec<_> = samples.iter().map(|sample| &sample.image).collect();
        let locs: Vec<_> = samples.iter().map(|sample| &sample.loc).collect();
        let confs: Vec<_> = samples.iter().map(|sample| &sample.conf).collect();
        let landms: Vec<_> = samples.iter().map(|sample| &sample.landm).collect();

        Ok(Self {
            epoch,
            step,
            image: Tensor::stack(&images, 0),
            loc: Tensor::stack(&locs, 0),
            conf: Tensor::stack(&confs, 0),
            landm: Tensor::stack(&landms, 0),
            indices,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.indices.len()
    }
}
