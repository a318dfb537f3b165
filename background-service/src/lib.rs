pub mod feed;
pub mod pipeline;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use feed::FeedService;
pub use pipeline::PublishPipeline;
pub use scheduler::{
    first_daily_occurrence, next_daily_occurrence, Recurrence, ScheduledTrigger, Scheduler,
};

use chrono::TimeZone;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};
use weather_core::{
    CoreError, HttpTransport, PosterConfig, PublishOutcome, SchedulingError, StateStore,
};

type RunNowReply = oneshot::Sender<PublishOutcome>;

/// Cloneable handle for talking to a running [`BackgroundService`].
#[derive(Clone)]
pub struct ServiceHandle {
    config: Arc<watch::Sender<PosterConfig>>,
    run_now: mpsc::Sender<RunNowReply>,
}

impl ServiceHandle {
    /// Replaces the configuration; the service rebuilds its triggers.
    pub fn reconfigure(&self, config: PosterConfig) {
        self.config.send_replace(config);
    }

    /// Runs the pipeline now and waits for its outcome. The schedule is
    /// rebuilt afterwards.
    pub async fn run_now(&self) -> Result<PublishOutcome, CoreError> {
        let (reply, outcome) = oneshot::channel();
        self.run_now
            .send(reply)
            .await
            .map_err(|_| SchedulingError::ServiceStopped)?;
        outcome
            .await
            .map_err(|_| CoreError::from(SchedulingError::ServiceStopped))
    }
}

/// Owns the scheduler and drives the publish pipeline from a single task.
pub struct BackgroundService<T, S, Tz: TimeZone = chrono::Local> {
    pipeline: PublishPipeline<T, S>,
    scheduler: Scheduler<Tz>,
    config: watch::Receiver<PosterConfig>,
    run_now: mpsc::Receiver<RunNowReply>,
}

impl<T: HttpTransport, S: StateStore, Tz: TimeZone> BackgroundService<T, S, Tz> {
    pub fn new(
        pipeline: PublishPipeline<T, S>,
        scheduler: Scheduler<Tz>,
        config: PosterConfig,
    ) -> (Self, ServiceHandle) {
        let (config_tx, config_rx) = watch::channel(config);
        let (run_now_tx, run_now_rx) = mpsc::channel(8);
        (
            Self {
                pipeline,
                scheduler,
                config: config_rx,
                run_now: run_now_rx,
            },
            ServiceHandle {
                config: Arc::new(config_tx),
                run_now: run_now_tx,
            },
        )
    }

    pub fn scheduler(&self) -> &Scheduler<Tz> {
        &self.scheduler
    }

    fn reschedule(&mut self) {
        let schedule = self.config.borrow().schedule_config();
        // A missing schedule is already recorded; manual runs still work.
        let _ = self.scheduler.configure(&schedule);
    }

    /// Runs until `shutdown` resolves. Each pipeline run completes before
    /// the next trigger or request is looked at.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), CoreError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.reschedule();
        info!("Background service started");

        let mut config_open = true;
        let mut requests_open = true;

        loop {
            let wait = self.scheduler.time_until_next();
            let next_trigger = async move {
                match wait {
                    Some(duration) => tokio::time::sleep(duration).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,

                changed = self.config.changed(), if config_open => {
                    match changed {
                        Ok(()) => {
                            debug!("Configuration changed, rescheduling");
                            self.reschedule();
                        }
                        Err(_) => config_open = false,
                    }
                }

                request = self.run_now.recv(), if requests_open => {
                    match request {
                        Some(reply) => {
                            let config = self.config.borrow().clone();
                            let outcome = self.pipeline.run(&config).await;
                            let _ = reply.send(outcome);
                            self.reschedule();
                        }
                        None => requests_open = false,
                    }
                }

                _ = next_trigger => {
                    if self.scheduler.take_due() {
                        let config = self.config.borrow().clone();
                        let outcome = self.pipeline.run(&config).await;
                        debug!("Scheduled run finished: {}", outcome.message);
                    }
                }
            }
        }

        self.scheduler.clear();
        info!("Background service stopped");
        Ok(())
    }
}
