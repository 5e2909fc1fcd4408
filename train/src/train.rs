//! The training worker.

use crate::{
    common::*,
    config::{Config, TrainingConfig},
    logging::{LoggingMessage, TrainingOutputLog},
    model::BaselineModel,
    training_stream::TrainingBatch,
    utils::{LrScheduler, RateCounter},
};

/// Run the training loop until the data stream ends.
///
/// Returns the number of optimization steps.
pub fn training_worker(
    config: Arc<Config>,
    num_anchors: usize,
    steps_per_epoch: usize,
    mut data_rx: mpsc::Receiver<TrainingBatch>,
    logging_tx: broadcast::Sender<LoggingMessage>,
) -> Result<usize> {
    let Config {
        training:
            TrainingConfig {
                device,
                backbone,
                epochs,
                batch_size,
                optimizer: ref optimizer_config,
                grad_clip,
                ref lr_schedule,
                ..
            },
        loss: ref loss_config,
        ..
    } = *config;

    info!("use device {:?}", device);
    info!(
        "{:?} backbone is not built, training the per-anchor baseline model",
        backbone
    );

    // init model
    const DUMMY_LR: f64 = 1.0;

    let vs = nn::VarStore::new(device);
    let root = vs.root();
    let model = BaselineModel::new(&root / "baseline", num_anchors, loss_config.num_classes.get());
    let multibox_loss = loss_config.multibox_loss_init().build()?;
    let loss_weights = loss_config.weights();
    let mut optimizer = nn::Sgd {
        momentum: optimizer_config.momentum().raw(),
        dampening: 0.0,
        wd: optimizer_config.weight_decay().raw(),
        nesterov: false,
    }
    .build(&vs, DUMMY_LR)?;

    // training
    info!("start training");
    let mut training_step = 0;
    let mut rate_counter = RateCounter::with_second_interval();
    let mut lr_scheduler = LrScheduler::new(lr_schedule, steps_per_epoch, epochs.get(), None)?;
    let mut lr_epoch = 0;

    while let Some(batch) = data_rx.blocking_recv() {
        let TrainingBatch {
            epoch,
            image,
            loc,
            conf,
            landm,
            ..
        } = batch.to_device(device);

        // skipped samples shorten an epoch, so realign the schedule on each new epoch
        if epoch > lr_epoch {
            lr_scheduler.set_step(epoch * steps_per_epoch);
            lr_epoch = epoch;
        }
        let lr = lr_scheduler.next();
        optimizer.set_lr(lr);

        // forward pass
        let output = model.forward(&image)?;

        // compute loss
        let losses = multibox_loss.forward(
            &output.loc,
            &loc,
            &output.conf,
            &conf,
            &output.landm,
            &landm,
        )?;
        let total_loss = losses.weighted(&loss_weights);

        // optimizer
        match grad_clip {
            Some(max_norm) => optimizer.backward_step_clip_norm(&total_loss, max_norm.raw()),
            None => optimizer.backward_step(&total_loss),
        }

        // print message
        rate_counter.add(1.0);
        if let Some(batch_rate) = rate_counter.rate() {
            let record_rate = batch_rate * batch_size.get() as f64;
            info!(
                "epoch: {}\tstep: {}\tlr: {:.5}\t{:.2} batches/s\t{:.2} records/s",
                epoch, training_step, lr, batch_rate, record_rate
            );
        }

        // send to logger
        let msg = TrainingOutputLog {
            epoch,
            step: training_step,
            lr,
            loc_loss: losses.loc_loss.double_value(&[]),
            conf_loss: losses.conf_loss.double_value(&[]),
            landm_loss: losses.landm_loss.double_value(&[]),
            total_loss: total_loss.double_value(&[]),
        };
        ensure!(
            msg.total_loss.is_finite(),
            "the loss diverges at step {}",
            training_step
        );
        logging_tx
            .send(LoggingMessage::new_training_output("training-output", msg))
            .map_err(|_err| format_err!("cannot send message to logger"))?;

        training_step += 1;
    }

    info!("training finished after {} steps", training_step);
    Ok(training_step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::LearningRateSchedule, logging::LoggingMessageKind};

    fn batch(epoch: usize, step: usize, num_anchors: i64) -> TrainingBatch {
        let opts = (Kind::Float, Device::Cpu);
        let conf = Tensor::zeros(&[2, num_anchors], (Kind::Int64, Device::Cpu));
        let _ = conf.narrow(1, 0, 3).fill_(1i64);
        let _ = conf.narrow(1, 3, 2).fill_(-1i64);

        TrainingBatch {
            epoch,
            step,
            image: Tensor::zeros(&[2, 3, 32, 32], opts),
            loc: Tensor::full(&[2, num_anchors, 4], 0.5, opts),
            conf,
            landm: Tensor::full(&[2, num_anchors, 10], -0.5, opts),
            indices: vec![0, 1],
        }
    }

    /// Train on `num_steps` identical batches and collect the logged outputs.
    fn run(
        config: Config,
        num_anchors: usize,
        num_steps: usize,
    ) -> Result<Vec<TrainingOutputLog>> {
        run_epochs(config, num_anchors, num_steps, &vec![0; num_steps])
    }

    /// Train on one identical batch per entry of `epochs`.
    fn run_epochs(
        config: Config,
        num_anchors: usize,
        steps_per_epoch: usize,
        epochs: &[usize],
    ) -> Result<Vec<TrainingOutputLog>> {
        let num_steps = epochs.len();
        let (data_tx, data_rx) = mpsc::channel(num_steps);
        let (logging_tx, mut logging_rx) = broadcast::channel(num_steps);
        for (step, &epoch) in epochs.iter().enumerate() {
            data_tx
                .try_send(batch(epoch, step, num_anchors as i64))
                .map_err(|_| format_err!("the data channel is full"))?;
        }
        drop(data_tx);

        let trained_steps = training_worker(
            Arc::new(config),
            num_anchors,
            steps_per_epoch,
            data_rx,
            logging_tx,
        )?;
        assert_eq!(trained_steps, num_steps);

        let mut outputs = vec![];
        while let Ok(msg) = logging_rx.try_recv() {
            let LoggingMessageKind::TrainingOutput(output) = msg.kind;
            outputs.push(output);
        }
        Ok(outputs)
    }

    #[test]
    fn baseline_training_reduces_loss() -> Result<()> {
        let mut config = Config::from_json5(include_str!("../../train.json5"))?;
        config.training.lr_schedule = LearningRateSchedule::Constant { lr: r64(0.01) };
        let num_steps = 20;

        let outputs = run(config, 42, num_steps)?;
        assert_eq!(outputs.len(), num_steps);
        assert!(outputs.iter().all(|output| output.lr == 0.01));
        assert!(outputs[num_steps - 1].total_loss < outputs[0].total_loss);
        Ok(())
    }

    #[test]
    fn grad_clip_limits_updates() -> Result<()> {
        let mut config = Config::from_json5(include_str!("../../train.json5"))?;
        config.training.lr_schedule = LearningRateSchedule::Constant { lr: r64(0.01) };

        let plain = run(config.clone(), 42, 2)?;
        config.training.grad_clip = Some(r64(1e-3));
        let clipped = run(config, 42, 2)?;

        // the first step sees the same parameters
        assert_eq!(plain[0].total_loss, clipped[0].total_loss);
        let plain_decrease = plain[0].total_loss - plain[1].total_loss;
        let clipped_decrease = clipped[0].total_loss - clipped[1].total_loss;
        assert!(plain_decrease > 0.0);
        assert!(clipped_decrease < plain_decrease);
        Ok(())
    }

    #[test]
    fn lr_schedule_realigns_on_short_epochs() -> Result<()> {
        let mut config = Config::from_json5(include_str!("../../train.json5"))?;
        config.training.lr_schedule = LearningRateSchedule::StepWise {
            steps: vec![(0, r64(0.1)), (3, r64(0.01))],
        };

        // the first epoch lost one of its 3 batches
        let outputs = run_epochs(config, 42, 3, &[0, 0, 1, 1, 1])?;
        let lrs: Vec<_> = outputs.iter().map(|output| output.lr).collect();
        assert_eq!(lrs, vec![0.1, 0.1, 0.01, 0.01, 0.01]);
        Ok(())
    }
}
