//! The training program for RetinaFace face detectors.

pub mod common;
pub mod config;
pub mod logging;
pub mod model;
pub mod train;
pub mod training_stream;
pub mod utils;

use crate::{
    common::*,
    config::{Config, DatasetConfig, TrainingConfig},
    training_stream::{TrainingStream, TrainingStreamInit},
};

/// The entry of training program.
pub async fn start(config: Arc<Config>) -> Result<()> {
    let start_time = Local::now();
    let logging_dir: Arc<Path> = {
        let dir = config
            .logging
            .dir
            .join(format!("{}", start_time.format(utils::FILE_STRFTIME)));
        dir.into_boxed_path().into()
    };

    // create dirs and save config
    {
        tokio::fs::create_dir_all(&*logging_dir).await?;
        let path = logging_dir.join("config.json5");
        let text = serde_json::to_string_pretty(&*config)?;
        tokio::fs::write(&path, text).await?;
    }

    // create channels
    let (logging_tx, logging_rx) = broadcast::channel(16);
    let (data_tx, data_rx) = mpsc::channel(2);

    // load dataset
    info!("loading dataset");
    let training_stream = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || build_training_stream(&config)).await??
    };
    let num_anchors = training_stream.num_anchors();
    let steps_per_epoch = training_stream.num_batches_per_epoch();
    ensure!(
        steps_per_epoch > 0,
        "the dataset has {} samples per epoch, fewer than the batch size {}",
        training_stream.num_samples_per_epoch(),
        config.training.batch_size
    );
    info!(
        "{} samples and {} batches per epoch",
        training_stream.num_samples_per_epoch(),
        steps_per_epoch
    );

    // start logger
    let logging_future = logging::logging_worker(logging_dir.clone(), logging_rx);

    // feeding worker
    let training_data_future = tokio::task::spawn(async move {
        let mut train_stream = training_stream.train_stream();

        while let Some(result) = train_stream.next().await {
            let batch = result?;
            data_tx
                .send(batch)
                .await
                .map_err(|_| format_err!("failed to send message to training worker"))?;
        }

        Fallible::Ok(())
    })
    .map(|result| Fallible::Ok(result??));

    // training worker
    let training_worker_future = {
        let config = config.clone();

        tokio::task::spawn_blocking(move || {
            train::training_worker(config, num_anchors, steps_per_epoch, data_rx, logging_tx)
        })
        .map(|result| Fallible::Ok(result??))
    };

    let ((), num_steps, ()) =
        futures::try_join!(training_data_future, training_worker_future, logging_future)?;
    info!(
        "trained {} steps, logs are saved in '{}'",
        num_steps,
        logging_dir.display()
    );

    Ok(())
}

/// Load the dataset and build the preprocessing pipeline.
pub fn build_training_stream(config: &Config) -> Result<TrainingStream> {
    let Config {
        dataset:
            DatasetConfig {
                ref label_file,
                ref image_dir,
            },
        ref anchor,
        ref encoder,
        ref preprocessor,
        training:
            TrainingConfig {
                batch_size,
                epochs,
                seed,
                num_workers,
                shuffle,
                distributed,
                on_sample_error,
                ..
            },
        ..
    } = *config;

    let dataset = match image_dir {
        Some(image_dir) => WiderFaceDataset::open_with_image_dir(label_file, image_dir)?,
        None => WiderFaceDataset::open(label_file)?,
    };
    let anchors = Arc::new(anchor.anchor_grid_init().build()?);
    let encoder = encoder.target_encoder_init(anchor.clip).build(anchors)?;
    let preprocessor = preprocessor
        .preprocessor_init(anchor.image_size.get())
        .build()?;

    TrainingStreamInit {
        batch_size: batch_size.get(),
        num_epochs: epochs.get(),
        seed,
        num_workers: num_workers.get(),
        shuffle,
        distributed,
        on_sample_error,
    }
    .build(Arc::new(dataset), Arc::new(preprocessor), Arc::new(encoder))
}
