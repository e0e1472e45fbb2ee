//! Background dispatch worker

use std::{fmt, sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{errors::WorkerError, MessageQueue, MessageStore, Transport};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle state of a [`DispatchWorker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No drain task is scheduled
    Stopped,

    /// The drain task runs on its interval
    Running,

    /// Scheduling has been disabled and the queue is being spilled
    Stopping,
}

/// Outcome of a single drain pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages the transport accepted
    pub delivered: usize,

    /// Messages the transport rejected; these are dropped, not retried
    pub failed: usize,
}

/// Drains a [`MessageQueue`] through a [`Transport`] on a fixed interval.
///
/// [`start`](Self::start) restores spilled messages and schedules the drain
/// task, the first pass running immediately. [`stop`](Self::stop) disables the
/// schedule, waits for the current pass to finish and spills whatever is still
/// queued through the [`MessageStore`]. `stop` must be awaited before the
/// process exits.
pub struct DispatchWorker<S>
where
    S: MessageStore,
{
    queue: MessageQueue,
    transport: Arc<dyn Transport>,
    store: Arc<S>,
    interval: Duration,
    state: WorkerState,
    shutdown: CancellationToken,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<S> DispatchWorker<S>
where
    S: MessageStore,
{
    /// Create a stopped worker
    ///
    /// # Arguments
    /// * `queue` - The shared queue producers write to.
    /// * `transport` - The transport every message is delivered through.
    /// * `store` - Where undelivered messages go when the worker stops.
    /// * `interval` - Time between drain passes.
    pub fn new(
        queue: MessageQueue,
        transport: Arc<dyn Transport>,
        store: Arc<S>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            transport,
            store,
            interval: interval.max(MIN_INTERVAL),
            state: WorkerState::Stopped,
            shutdown: CancellationToken::new(),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// The queue this worker drains
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// The current lifecycle state
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Token handed to every [`Transport::deliver`] call.
    ///
    /// Cancelling it stops draining after the current message and makes
    /// transports skip sends that have not started yet. A graceful
    /// [`stop`](Self::stop) does not cancel it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Restore spilled messages and schedule the drain task.
    ///
    /// Restored messages are on the queue before the first pass runs. A store
    /// that cannot be read is logged and skipped.
    ///
    /// # Returns
    /// The number of restored messages, or [`WorkerError::AlreadyRunning`].
    pub async fn start(&mut self) -> Result<usize, WorkerError> {
        if self.state != WorkerState::Stopped {
            return Err(WorkerError::AlreadyRunning);
        }

        info!(
            transport = self.transport.name(),
            interval_ms = self.interval.as_millis() as u64,
            "starting dispatch worker"
        );

        let restored = match self.store.restore_all(&self.queue).await {
            Ok(count) => {
                info!(restored = count, "restored spooled messages");
                count
            }
            Err(e) => {
                error!(error = %e, "could not restore spooled messages");
                0
            }
        };

        if self.shutdown.is_cancelled() {
            self.shutdown = CancellationToken::new();
        }

        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        self.task = Some(tokio::spawn(run(
            self.queue.clone(),
            self.transport.clone(),
            self.interval,
            self.shutdown.clone(),
            self.cancel.clone(),
        )));
        self.state = WorkerState::Running;

        Ok(restored)
    }

    /// Disable the schedule and spill the queue.
    ///
    /// Waits for an in-progress drain pass to finish first. Calling `stop` on
    /// a worker that never started still spills the queue.
    ///
    /// # Returns
    /// The number of spilled messages, or [`WorkerError::Spool`] if the store
    /// was unavailable, in which case the messages stay in memory. The worker
    /// is [`WorkerState::Stopped`] afterwards either way.
    pub async fn stop(&mut self) -> Result<usize, WorkerError> {
        if self.state == WorkerState::Running {
            info!("stopping dispatch worker");

            self.state = WorkerState::Stopping;
            self.shutdown.cancel();

            if let Some(task) = self.task.take() {
                if let Err(e) = task.await {
                    error!(error = %e, "dispatch task ended abnormally");
                }
            }
        }

        let result = self.store.store_remaining(&self.queue).await;
        self.state = WorkerState::Stopped;

        match result {
            Ok(count) => {
                info!(spooled = count, "dispatch worker stopped");
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, pending = self.queue.len(), "could not spool undelivered messages");
                Err(e.into())
            }
        }
    }

    /// Run one drain pass now, on the caller's task
    pub async fn drain(&self) -> DrainReport {
        drain_queue(
            &self.queue,
            self.transport.as_ref(),
            &self.shutdown,
            &self.cancel,
        )
        .await
    }
}

impl<S> fmt::Debug for DispatchWorker<S>
where
    S: MessageStore,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchWorker")
            .field("transport", &self.transport.name())
            .field("interval", &self.interval)
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl<S> Drop for DispatchWorker<S>
where
    S: MessageStore,
{
    fn drop(&mut self) {
        if self.task.is_some() {
            warn!(
                pending = self.queue.len(),
                "dispatch worker dropped without stop; pending messages were not spooled"
            );
            self.shutdown.cancel();
        }
    }
}

async fn run(
    queue: MessageQueue,
    transport: Arc<dyn Transport>,
    interval: Duration,
    shutdown: CancellationToken,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = drain_queue(&queue, transport.as_ref(), &shutdown, &cancel).await;

                if report.delivered + report.failed > 0 {
                    info!(delivered = report.delivered, failed = report.failed, "drained queue");
                }
            }
        }
    }

    debug!("dispatch loop exited");
}

/// Pops until the queue is empty or either token is cancelled. A delivery
/// failure is logged and the message dropped; it never stops the pass.
async fn drain_queue(
    queue: &MessageQueue,
    transport: &dyn Transport,
    shutdown: &CancellationToken,
    cancel: &CancellationToken,
) -> DrainReport {
    let mut report = DrainReport::default();

    debug!(transport = transport.name(), "processing queue");

    while !shutdown.is_cancelled() && !cancel.is_cancelled() {
        let Some(message) = queue.try_dequeue() else {
            break;
        };

        match transport.deliver(&message, cancel).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                error!(
                    transport = transport.name(),
                    subject = %message.subject,
                    recipients = message.recipients.len(),
                    error = %e,
                    "message delivery failed; message dropped"
                );
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc, time::Duration};

    use parking_lot::Mutex;
    use tempfile::TempDir;
    use testresult::TestResult;
    use tracing::{
        field::{Field, Visit},
        Event, Level, Subscriber,
    };
    use tracing_subscriber::{
        layer::{Context, SubscriberExt},
        Layer,
    };

    use crate::{
        domain::messaging::{
            errors::{SpoolError, TransportError},
            tests::{MockMessageStore, MockTransport},
            EmailAddress, Message, MessageBuilder,
        },
        infrastructure::spool::FileSpool,
    };

    use super::*;

    const LONG_INTERVAL: Duration = Duration::from_secs(3600);

    /// Collects the message of every error-level event
    #[derive(Clone, Default)]
    struct ErrorEvents(Arc<Mutex<Vec<String>>>);

    #[derive(Default)]
    struct MessageField(String);

    impl Visit for MessageField {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: Subscriber> Layer<S> for ErrorEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::ERROR {
                let mut message = MessageField::default();
                event.record(&mut message);
                self.0.lock().push(message.0);
            }
        }
    }

    fn message(subject: &str) -> Message {
        MessageBuilder::new()
            .from("from@example.com")
            .to("to@example.com")
            .subject(subject)
            .text_body("body")
            .build()
            .expect("valid message")
    }

    fn transport(mock: MockTransport) -> Arc<dyn Transport> {
        Arc::new(mock)
    }

    fn named(mut mock: MockTransport) -> MockTransport {
        mock.expect_name().return_const("mock");
        mock
    }

    fn spool_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
        match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn wait_until_empty(queue: &MessageQueue) {
        for _ in 0..200 {
            if queue.is_empty() {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_drain_empty_queue_makes_no_deliveries() {
        let mut mock = named(MockTransport::new());
        mock.expect_deliver().times(0);

        let worker = DispatchWorker::new(
            MessageQueue::new(),
            transport(mock),
            Arc::new(MockMessageStore::new()),
            LONG_INTERVAL,
        );

        assert_eq!(worker.drain().await, DrainReport::default());
    }

    #[tokio::test]
    async fn test_drain_delivers_all_recipients_in_one_call() -> TestResult {
        let message = MessageBuilder::new()
            .from("from@example.com")
            .to_list("a@x.com;b@x.com")
            .subject("hello")
            .build()?;

        let expected = vec![EmailAddress::new("a@x.com")?, EmailAddress::new("b@x.com")?];

        let mut mock = named(MockTransport::new());
        mock.expect_deliver()
            .times(1)
            .withf(move |message, _| message.recipients == expected)
            .returning(|_, _| Ok(()));

        let queue = MessageQueue::new();
        queue.enqueue(message);

        let worker = DispatchWorker::new(
            queue.clone(),
            transport(mock),
            Arc::new(MockMessageStore::new()),
            LONG_INTERVAL,
        );

        let report = worker.drain().await;

        assert_eq!(report.delivered, 1);
        assert!(queue.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_stop_draining() {
        let mut mock = named(MockTransport::new());
        mock.expect_deliver()
            .times(2)
            .returning(|message, _| match message.subject.as_str() {
                "first" => Err(TransportError::Rejected {
                    status: 550,
                    body: "mailbox unavailable".to_string(),
                }),
                _ => Ok(()),
            });

        let queue = MessageQueue::new();
        queue.enqueue(message("first"));
        queue.enqueue(message("second"));

        let worker = DispatchWorker::new(
            queue.clone(),
            transport(mock),
            Arc::new(MockMessageStore::new()),
            LONG_INTERVAL,
        );

        let errors = ErrorEvents::default();
        let report = {
            let _guard =
                tracing::subscriber::set_default(tracing_subscriber::registry().with(errors.clone()));
            worker.drain().await
        };

        assert_eq!(
            report,
            DrainReport {
                delivered: 1,
                failed: 1
            }
        );
        assert!(queue.is_empty());

        let errors = errors.0.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("message delivery failed"));
    }

    #[tokio::test]
    async fn test_cancelled_worker_leaves_messages_queued() {
        let mut mock = named(MockTransport::new());
        mock.expect_deliver().times(0);

        let queue = MessageQueue::new();
        queue.enqueue(message("kept"));

        let worker = DispatchWorker::new(
            queue.clone(),
            transport(mock),
            Arc::new(MockMessageStore::new()),
            LONG_INTERVAL,
        );
        worker.cancellation_token().cancel();

        assert_eq!(worker.drain().await, DrainReport::default());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_any_tick_spills_queue() -> TestResult {
        let dir = TempDir::new()?;
        let spool_dir = dir.path().join("messages");

        let queue = MessageQueue::new();
        queue.enqueue(message("spill me"));

        let mut worker = DispatchWorker::new(
            queue.clone(),
            transport(named(MockTransport::new())),
            Arc::new(FileSpool::new(&spool_dir)),
            LONG_INTERVAL,
        );

        let spooled = worker.stop().await?;

        let files = spool_files(&spool_dir);

        assert_eq!(spooled, 1);
        assert_eq!(files.len(), 1);
        assert!(fs::read_to_string(&files[0])?.contains("spill me"));
        assert!(queue.is_empty());
        assert_eq!(worker.state(), WorkerState::Stopped);

        Ok(())
    }

    #[tokio::test]
    async fn test_start_restores_spilled_messages() -> TestResult {
        let dir = TempDir::new()?;
        let spool = Arc::new(FileSpool::new(dir.path()));

        let previous = MessageQueue::new();
        previous.enqueue(message("restored"));
        spool.store_remaining(&previous).await?;
        assert_eq!(spool_files(dir.path()).len(), 1);

        let queue = MessageQueue::new();
        let mut worker = DispatchWorker::new(
            queue.clone(),
            transport(named(MockTransport::new())),
            spool.clone(),
            LONG_INTERVAL,
        );

        let restored = worker.start().await?;

        assert_eq!(restored, 1);
        assert_eq!(queue.len(), 1);
        assert!(spool_files(dir.path()).is_empty());
        assert_eq!(worker.state(), WorkerState::Running);

        assert_eq!(worker.stop().await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_start_twice_fails() -> TestResult {
        let mut store = MockMessageStore::new();
        store.expect_restore_all().times(1).returning(|_| Ok(0));
        store.expect_store_remaining().times(1).returning(|_| Ok(0));

        let mut worker = DispatchWorker::new(
            MessageQueue::new(),
            transport(named(MockTransport::new())),
            Arc::new(store),
            LONG_INTERVAL,
        );

        worker.start().await?;

        assert!(matches!(
            worker.start().await,
            Err(WorkerError::AlreadyRunning)
        ));

        worker.stop().await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_unavailable_store_does_not_prevent_start() -> TestResult {
        let mut store = MockMessageStore::new();
        store.expect_restore_all().times(1).returning(|_| {
            Err(SpoolError::NotADirectory("/nowhere".into()))
        });
        store.expect_store_remaining().times(1).returning(|_| {
            Err(SpoolError::NotADirectory("/nowhere".into()))
        });

        let mut worker = DispatchWorker::new(
            MessageQueue::new(),
            transport(named(MockTransport::new())),
            Arc::new(store),
            LONG_INTERVAL,
        );

        assert_eq!(worker.start().await?, 0);
        assert!(matches!(worker.stop().await, Err(WorkerError::Spool(_))));
        assert_eq!(worker.state(), WorkerState::Stopped);

        Ok(())
    }

    #[tokio::test]
    async fn test_running_worker_drains_on_first_tick() -> TestResult {
        let mut mock = named(MockTransport::new());
        mock.expect_deliver().times(1).returning(|_, _| Ok(()));

        let mut store = MockMessageStore::new();
        store.expect_restore_all().times(1).returning(|_| Ok(0));
        store.expect_store_remaining().times(1).returning(|_| Ok(0));

        let queue = MessageQueue::new();
        queue.enqueue(message("tick"));

        let mut worker =
            DispatchWorker::new(queue.clone(), transport(mock), Arc::new(store), LONG_INTERVAL);

        worker.start().await?;
        wait_until_empty(&queue).await;

        assert!(queue.is_empty());

        worker.stop().await?;

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nothing_is_lost_across_stop_and_start() -> TestResult {
        let producers = 8;
        let per_producer = 25;
        let total = producers * per_producer;

        let dir = TempDir::new()?;
        let spool = Arc::new(FileSpool::new(dir.path().join("spool")));

        let queue = MessageQueue::new();
        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for i in 0..per_producer {
                        queue.enqueue(message(&format!("{p}-{i}")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await?;
        }

        let mut first = DispatchWorker::new(
            queue.clone(),
            transport(named(MockTransport::new())),
            spool.clone(),
            LONG_INTERVAL,
        );
        assert_eq!(first.stop().await?, total);
        assert!(queue.is_empty());

        let mut mock = named(MockTransport::new());
        mock.expect_deliver().times(total).returning(|_, _| Ok(()));

        let restarted = MessageQueue::new();
        let mut second =
            DispatchWorker::new(restarted.clone(), transport(mock), spool, LONG_INTERVAL);

        assert_eq!(second.start().await?, total);
        wait_until_empty(&restarted).await;
        second.drain().await;

        assert_eq!(second.stop().await?, 0);
        assert!(spool_files(&dir.path().join("spool")).is_empty());

        Ok(())
    }
}
