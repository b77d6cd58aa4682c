//! Self-managed repeating timer around a [`Trigger`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use evm_trigger::{
//!     BlockFetcher, FileStateStore, Poller, ScannerMessage, Trigger, TriggerConfig,
//! };
//! use tokio_stream::StreamExt;
//! use tracing::{error, info};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TriggerConfig::load("trigger.yaml")?;
//!     let fetcher = BlockFetcher::new(config.rpc.connect().await?);
//!     let store = FileStateStore::new("state.json");
//!     let trigger = Trigger::from_config(&config, Arc::new(fetcher), Arc::new(store))?;
//!
//!     let client = Poller::new(trigger).with_polling_interval(config.polling_interval()).run();
//!     let mut stream = client.stream().await?;
//!
//!     while let Some(message) = stream.next().await {
//!         match message {
//!             ScannerMessage::Data(items) => info!(count = items.len(), "Received items"),
//!             ScannerMessage::Error(e) => error!("Poll failed: {e}"),
//!             ScannerMessage::Status(status) => info!(?status, "Status"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::{MissedTickBehavior, interval},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::{
    config::DEFAULT_POLLING_INTERVAL_MS,
    error::TriggerError,
    trigger::{PollOutcome, Trigger, TriggerItem},
    types::{PollStatus, ScannerMessage},
};

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(DEFAULT_POLLING_INTERVAL_MS);

const MAX_BUFFERED_MESSAGES: usize = 1024;

pub type TriggerMessage = ScannerMessage<Vec<TriggerItem>, TriggerError>;

#[derive(Debug)]
pub enum Command {
    Subscribe {
        sender: mpsc::Sender<TriggerMessage>,
        response: oneshot::Sender<Result<(), TriggerError>>,
    },
    PollNow {
        response: oneshot::Sender<Result<PollOutcome, TriggerError>>,
    },
    Unsubscribe {
        response: oneshot::Sender<Result<(), TriggerError>>,
    },
    Shutdown {
        response: oneshot::Sender<Result<(), TriggerError>>,
    },
}

pub struct Poller {
    trigger: Arc<Trigger>,
    polling_interval: Duration,
}

impl Poller {
    #[must_use]
    pub fn new(trigger: Trigger) -> Self {
        Self { trigger: Arc::new(trigger), polling_interval: DEFAULT_POLLING_INTERVAL }
    }

    /// Sets the time between the starts of two scheduled polls.
    #[must_use]
    pub fn with_polling_interval(mut self, polling_interval: Duration) -> Self {
        self.polling_interval = polling_interval;
        self
    }

    /// Starts the polling service and returns a client for sending commands.
    ///
    /// Scheduled polls only run while a subscriber is attached.
    #[must_use]
    pub fn run(self) -> PollerClient {
        let (service, cmd_tx) = Service::new(self.trigger, self.polling_interval);
        tokio::spawn(async move {
            service.run().await;
        });
        PollerClient::new(cmd_tx)
    }
}

struct Service {
    trigger: Arc<Trigger>,
    polling_interval: Duration,
    subscriber: Option<mpsc::Sender<TriggerMessage>>,
    cycle_count: u64,
    error_count: u64,
    command_receiver: mpsc::Receiver<Command>,
    shutdown: bool,
}

impl Service {
    fn new(trigger: Arc<Trigger>, polling_interval: Duration) -> (Self, mpsc::Sender<Command>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(100);

        let service = Self {
            trigger,
            polling_interval,
            subscriber: None,
            cycle_count: 0,
            error_count: 0,
            command_receiver: cmd_rx,
            shutdown: false,
        };

        (service, cmd_tx)
    }

    async fn run(mut self) {
        info!(stream = %self.trigger.stream(), interval = ?self.polling_interval, "Starting poller");

        let mut ticker = interval(self.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.shutdown {
            tokio::select! {
                cmd = self.command_receiver.recv() => {
                    if let Some(command) = cmd {
                        if let Err(e) = self.handle_command(command).await {
                            error!("Command handling error: {}", e);
                            self.error_count += 1;
                        }
                    } else {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
                _ = ticker.tick(), if self.subscriber.is_some() => {
                    self.run_cycle().await;
                }
            }
        }

        info!(cycles = self.cycle_count, errors = self.error_count, "Poller stopped");
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), TriggerError> {
        match command {
            Command::Subscribe { sender, response } => {
                let result = self.ensure_no_subscriber();
                if result.is_ok() {
                    info!("Subscriber attached");
                    self.subscriber = Some(sender);
                }
                let _ = response.send(result);
            }
            Command::PollNow { response } => {
                let result = self.trigger.poll().await;
                self.cycle_count += 1;
                let _ = response.send(result);
            }
            Command::Unsubscribe { response } => {
                self.handle_unsubscribe();
                let _ = response.send(Ok(()));
            }
            Command::Shutdown { response } => {
                self.shutdown = true;
                self.handle_unsubscribe();
                let _ = response.send(Ok(()));
            }
        }
        Ok(())
    }

    async fn run_cycle(&mut self) {
        self.cycle_count += 1;
        match self.trigger.poll().await {
            Ok(PollOutcome::Initialized { baseline, items }) => {
                if !items.is_empty() {
                    self.send_to_subscriber(ScannerMessage::Data(items)).await;
                }
                self.send_to_subscriber(ScannerMessage::Status(PollStatus::Initialized { baseline }))
                    .await;
            }
            Ok(PollOutcome::Advanced { cursor, items }) => {
                let message = if items.is_empty() {
                    ScannerMessage::Status(PollStatus::CaughtUp { cursor })
                } else {
                    ScannerMessage::Data(items)
                };
                self.send_to_subscriber(message).await;
            }
            Err(e) => {
                warn!(error = %e, "Poll cycle failed, cursor unchanged");
                self.error_count += 1;
                self.send_to_subscriber(ScannerMessage::Error(e)).await;
            }
        }
    }

    async fn send_to_subscriber(&mut self, message: TriggerMessage) {
        if let Some(ref sender) = self.subscriber {
            if let Err(err) = sender.send(message).await {
                warn!(error = %err, "Downstream channel closed, failed sending the message to subscriber");
                self.subscriber = None;
            }
        }
    }

    fn handle_unsubscribe(&mut self) {
        if self.subscriber.take().is_some() {
            info!("Unsubscribing current subscriber");
        }
    }

    fn ensure_no_subscriber(&self) -> Result<(), TriggerError> {
        if self.subscriber.as_ref().is_some_and(|sender| !sender.is_closed()) {
            return Err(TriggerError::MultipleSubscribers);
        }
        Ok(())
    }
}

pub struct PollerClient {
    command_sender: mpsc::Sender<Command>,
}

impl PollerClient {
    #[must_use]
    pub fn new(command_sender: mpsc::Sender<Command>) -> Self {
        Self { command_sender }
    }

    /// Attaches a subscriber and starts scheduled polling.
    ///
    /// # Errors
    ///
    /// * `TriggerError::ServiceShutdown` - if the service is already shutting down.
    /// * `TriggerError::MultipleSubscribers` - if another stream is still attached.
    pub async fn stream(&self) -> Result<ReceiverStream<TriggerMessage>, TriggerError> {
        let (messages_sender, messages_receiver) = mpsc::channel(MAX_BUFFERED_MESSAGES);
        let (response_tx, response_rx) = oneshot::channel();

        let command = Command::Subscribe { sender: messages_sender, response: response_tx };

        self.command_sender.send(command).await.map_err(|_| TriggerError::ServiceShutdown)?;

        response_rx.await.map_err(|_| TriggerError::ServiceShutdown)??;

        Ok(ReceiverStream::new(messages_receiver))
    }

    /// Runs a poll cycle immediately, after any cycle already in flight, and
    /// returns its outcome to the caller instead of the subscriber.
    ///
    /// # Errors
    ///
    /// * `TriggerError::ServiceShutdown` - if the service is already shutting down.
    /// * Any error of the poll cycle itself.
    pub async fn poll_now(&self) -> Result<PollOutcome, TriggerError> {
        let (response_tx, response_rx) = oneshot::channel();

        let command = Command::PollNow { response: response_tx };

        self.command_sender.send(command).await.map_err(|_| TriggerError::ServiceShutdown)?;

        response_rx.await.map_err(|_| TriggerError::ServiceShutdown)?
    }

    /// Detaches the current subscriber, pausing scheduled polling.
    ///
    /// # Errors
    ///
    /// * `TriggerError::ServiceShutdown` - if the service is already shutting down.
    pub async fn unsubscribe(&self) -> Result<(), TriggerError> {
        let (response_tx, response_rx) = oneshot::channel();

        let command = Command::Unsubscribe { response: response_tx };

        self.command_sender.send(command).await.map_err(|_| TriggerError::ServiceShutdown)?;

        response_rx.await.map_err(|_| TriggerError::ServiceShutdown)?
    }

    /// Stops the service. A cycle already running completes first; no new
    /// cycle starts afterwards.
    ///
    /// # Errors
    ///
    /// * `TriggerError::ServiceShutdown` - if the service is already shutting down.
    pub async fn shutdown(&self) -> Result<(), TriggerError> {
        let (response_tx, response_rx) = oneshot::channel();

        let command = Command::Shutdown { response: response_tx };

        self.command_sender.send(command).await.map_err(|_| TriggerError::ServiceShutdown)?;

        response_rx.await.map_err(|_| TriggerError::ServiceShutdown)?
    }
}
