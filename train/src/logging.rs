//! Data logging toolkit.

use crate::{common::*, utils::RateCounter};
use tokio::{
    fs::File,
    io::{AsyncWriteExt as _, BufWriter},
};

pub use logging_message::*;
pub use logging_worker::*;

mod logging_worker {
    use super::*;

    /// The file name of training metrics under the logging directory.
    pub const METRICS_FILE_NAME: &str = "metrics.jsonl";

    /// The data logging worker.
    #[derive(Debug)]
    pub struct LoggingWorker {
        writer: BufWriter<File>,
        rate_counter: RateCounter,
        rx: broadcast::Receiver<LoggingMessage>,
    }

    impl LoggingWorker {
        /// Create a data logging worker.
        async fn new(
            logging_dir: Arc<Path>,
            rx: broadcast::Receiver<LoggingMessage>,
        ) -> Result<Self> {
            tokio::fs::create_dir_all(&*logging_dir).await?;
            let path = logging_dir.join(METRICS_FILE_NAME);
            let file = File::create(&path)
                .await
                .with_context(|| format!("failed to create '{}'", path.display()))?;

            Ok(Self {
                writer: BufWriter::new(file),
                rate_counter: RateCounter::with_second_interval(),
                rx,
            })
        }

        /// Start the data logging worker.
        async fn start(mut self) -> Result<()> {
            loop {
                let LoggingMessage { tag, kind } = match self.rx.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(num_skipped)) => {
                        warn!("logging worker lagged behind, {} messages dropped", num_skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                self.rate_counter.add(1.0);

                match kind {
                    LoggingMessageKind::TrainingOutput(msg) => {
                        self.log_training_output(&tag, msg).await?;
                    }
                }

                if let Some(rate) = self.rate_counter.rate() {
                    info!("processed {:.2} events/s", rate);
                }
            }

            self.writer.flush().await?;
            Ok(())
        }

        async fn log_training_output(&mut self, tag: &str, msg: TrainingOutputLog) -> Result<()> {
            let line = serde_json::to_string(&MetricsRecord { tag, output: &msg })?;
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            self.writer.flush().await?;
            Ok(())
        }
    }

    #[derive(Serialize)]
    struct MetricsRecord<'a> {
        tag: &'a str,
        #[serde(flatten)]
        output: &'a TrainingOutputLog,
    }

    /// Run the logging worker until all senders are dropped.
    pub async fn logging_worker(
        logging_dir: Arc<Path>,
        rx: broadcast::Receiver<LoggingMessage>,
    ) -> Result<()> {
        LoggingWorker::new(logging_dir, rx).await?.start().await
    }
}

mod logging_message {
    use super::*;

    /// The message type that is accepted by the logging worker.
    #[derive(Debug, Clone)]
    pub struct LoggingMessage {
        pub tag: Cow<'static, str>,
        pub kind: LoggingMessageKind,
    }

    impl LoggingMessage {
        pub fn new_training_output<S>(tag: S, msg: TrainingOutputLog) -> Self
        where
            S: Into<Cow<'static, str>>,
        {
            Self {
                tag: tag.into(),
                kind: LoggingMessageKind::TrainingOutput(msg),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub enum LoggingMessageKind {
        TrainingOutput(TrainingOutputLog),
    }

    /// The losses and learning rate of one training step.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TrainingOutputLog {
        pub epoch: usize,
        pub step: usize,
        pub lr: f64,
        pub loc_loss: f64,
        pub conf_loss: f64,
        pub landm_loss: f64,
        pub total_loss: f64,
    }
}
