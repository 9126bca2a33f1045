//! Runs one consumer task per subscription and stops them together

use crate::consumer::{ConsumerError, ConsumerResult, StreamConsumer};
use crate::core::shutdown::ShutdownCoordinator;
use futures::future::join_all;
use tokio::task::JoinHandle;

pub struct ConsumerSupervisor {
    shutdown: ShutdownCoordinator,
    tasks: Vec<(String, JoinHandle<ConsumerResult<()>>)>,
}

impl ConsumerSupervisor {
    pub fn new(shutdown: ShutdownCoordinator) -> Self {
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Start `consumer` on its own task; it stops when the coordinator fires
    pub fn spawn(&mut self, consumer: StreamConsumer) {
        let label = format!("{}/{}", consumer.primary_stream(), consumer.group());
        let shutdown = self.shutdown.subscribe();
        log::debug!("Spawning consumer for {label}");
        self.tasks
            .push((label, tokio::spawn(consumer.run(shutdown))));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for a shutdown request, then stop every consumer
    pub async fn run_until_shutdown(self) -> ConsumerResult<()> {
        self.shutdown.wait().await;
        self.stop().await
    }

    /// Request shutdown and wait for every consumer; returns the first failure
    pub async fn stop(self) -> ConsumerResult<()> {
        self.shutdown.trigger_shutdown();

        let (labels, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let mut first_error = None;
        for (label, result) in labels.into_iter().zip(join_all(handles).await) {
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => ConsumerError::Task {
                    name: label.clone(),
                    message: e.to_string(),
                },
            };
            log::error!("Consumer {label} failed: {error}");
            first_error.get_or_insert(error);
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
