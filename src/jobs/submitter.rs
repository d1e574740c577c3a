use std::time::Duration;

use tokio::sync::Mutex;
use tracing::instrument;

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::jobs::envelope::{JobConfirmation, JobEnvelope};
use crate::jobs::transport::{WorkerConnector, WorkerTransport, ZmqConnector};

/// Hands jobs to the worker over one long lived request/reply channel.
///
/// The channel only supports a single outstanding request, so the lock
/// around it is held for the whole exchange: a second caller's request can
/// not be sent until the first caller received its reply. The submitter is
/// meant to be constructed once at startup and shared.
pub struct JobSubmitter {
    connector: Box<dyn WorkerConnector>,
    channel: Mutex<Option<Box<dyn WorkerTransport>>>,
    reply_timeout: Duration,
}

impl JobSubmitter {
    /// Creates the submitter and attempts to connect right away.
    ///
    /// A worker that is not up yet is not fatal, the connection is retried
    /// on the first submission.
    pub async fn connect(cfg: &WorkerConfig) -> Self {
        let submitter = Self::new(Box::new(ZmqConnector::new(cfg.endpoint())), cfg.reply_timeout());

        {
            let mut channel = submitter.channel.lock().await;
            match submitter.open().await {
                Ok(transport) => *channel = Some(transport),
                Err(e) => warn!("Worker is not reachable yet, will retry on submit: {}", e),
            }
        }

        submitter
    }

    pub fn new(connector: Box<dyn WorkerConnector>, reply_timeout: Duration) -> Self {
        Self {
            connector,
            channel: Mutex::new(None),
            reply_timeout,
        }
    }

    /// Sends the envelope and waits for the worker to confirm it.
    ///
    /// Fails with `Validation` before touching the channel if the envelope
    /// is invalid, `Rejected` if the worker declined the job and
    /// `Transport` if no well formed reply arrived in time.
    #[instrument(skip(self, envelope), fields(job_id = ?envelope.job_id))]
    pub async fn submit(&self, envelope: &JobEnvelope) -> Result<JobConfirmation> {
        envelope.validate()?;
        let request = envelope.encode()?;

        let reply = {
            let mut channel = self.channel.lock().await;

            if channel.is_none() {
                *channel = Some(self.open().await?);
            }

            let result = match channel.as_mut() {
                Some(transport) => {
                    tokio::time::timeout(self.reply_timeout, transport.exchange(request)).await
                },
                None => return Err(Error::Transport("worker channel is not open".to_string())),
            };

            match result {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    // A REQ channel without a reply can not send again.
                    warn!("Dropping worker channel after a failed exchange: {}", e);
                    *channel = None;
                    return Err(e);
                },
                Err(_) => {
                    warn!(
                        "Worker did not reply within {:?}, dropping channel",
                        self.reply_timeout,
                    );
                    *channel = None;
                    return Err(Error::Transport(format!(
                        "no reply from worker within {:?}",
                        self.reply_timeout,
                    )));
                },
            }
        };

        let confirmation = JobConfirmation::decode(&reply)
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !confirmation.accepted {
            warn!("Worker declined the job");
            return Err(Error::Rejected(envelope.job_id));
        }

        debug!("Got job confirmation from worker");
        Ok(confirmation)
    }

    /// Whether a channel to the worker is currently held.
    pub async fn is_connected(&self) -> bool {
        self.channel.lock().await.is_some()
    }

    async fn open(&self) -> Result<Box<dyn WorkerTransport>> {
        match tokio::time::timeout(self.reply_timeout, self.connector.connect()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport(format!(
                "timed out connecting to worker @ {}",
                self.connector.endpoint(),
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;

    use super::*;
    use crate::config::ImageFormat;
    use crate::error::ErrorKind;

    /// What the fake worker does with the next request.
    #[derive(Clone)]
    pub(crate) enum Reply {
        Send(Vec<u8>),
        Fail,
        Hang,
    }

    impl Reply {
        pub(crate) fn accept() -> Self {
            Self::Send(br#"{"is_ok": true}"#.to_vec())
        }

        pub(crate) fn decline() -> Self {
            Self::Send(br#"{"is_ok": false}"#.to_vec())
        }
    }

    /// An in-process worker recording every event seen on the wire.
    #[derive(Clone, Default)]
    pub(crate) struct FakeWorker {
        pub(crate) replies: Arc<StdMutex<VecDeque<Reply>>>,
        pub(crate) wire: Arc<StdMutex<Vec<String>>>,
        pub(crate) requests: Arc<StdMutex<Vec<Vec<u8>>>>,
        pub(crate) connects: Arc<AtomicUsize>,
    }

    impl FakeWorker {
        pub(crate) fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
            let worker = Self::default();
            worker.replies.lock().unwrap().extend(replies);
            worker
        }

        pub(crate) fn submitter(&self) -> JobSubmitter {
            JobSubmitter::new(Box::new(self.clone()), Duration::from_millis(200))
        }

        pub(crate) fn requests(&self) -> Vec<JobEnvelope> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|raw| JobEnvelope::decode(raw).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl WorkerConnector for FakeWorker {
        async fn connect(&self) -> Result<Box<dyn WorkerTransport>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(self.clone()))
        }

        fn endpoint(&self) -> &str {
            "fake://worker"
        }
    }

    #[async_trait]
    impl WorkerTransport for FakeWorker {
        async fn exchange(&mut self, request: Vec<u8>) -> Result<Vec<u8>> {
            let envelope = JobEnvelope::decode(&request)?;
            let tag = envelope.source_object_name.clone();
            self.wire.lock().unwrap().push(format!("request:{}", tag));
            self.requests.lock().unwrap().push(request);

            // Give a concurrent caller the chance to interleave if it could.
            tokio::time::sleep(Duration::from_millis(10)).await;

            let next = self.replies.lock().unwrap().pop_front().unwrap_or_else(Reply::accept);
            match next {
                Reply::Send(reply) => {
                    self.wire.lock().unwrap().push(format!("reply:{}", tag));
                    Ok(reply)
                },
                Reply::Fail => Err(Error::Transport("connection reset".to_string())),
                Reply::Hang => std::future::pending().await,
            }
        }
    }

    fn envelope(source: &str) -> JobEnvelope {
        JobEnvelope::new(source, 100, 100, ImageFormat::Png).with_job_id(uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn accepted_job_returns_confirmation() -> anyhow::Result<()> {
        let worker = FakeWorker::with_replies([Reply::accept()]);
        let submitter = worker.submitter();

        let confirmation = submitter.submit(&envelope("cat.png")).await?;
        assert!(confirmation.accepted);
        assert_eq!(worker.requests()[0].source_object_name, "cat.png");
        Ok(())
    }

    #[tokio::test]
    async fn declined_job_is_rejected() {
        let worker = FakeWorker::with_replies([Reply::decline()]);
        let submitter = worker.submitter();

        let err = submitter.submit(&envelope("cat.png")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[tokio::test]
    async fn invalid_envelope_never_reaches_the_wire() {
        let worker = FakeWorker::default();
        let submitter = worker.submitter();

        let bad = JobEnvelope::new("cat.png", 0, 100, ImageFormat::Png);
        let err = submitter.submit(&bad).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(worker.wire.lock().unwrap().is_empty());
        assert_eq!(worker.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_reply_is_a_transport_failure() {
        let worker = FakeWorker::with_replies([Reply::Send(b"garbage".to_vec())]);
        let submitter = worker.submitter();

        let err = submitter.submit(&envelope("cat.png")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(submitter.is_connected().await);
    }

    #[tokio::test]
    async fn concurrent_submits_never_interleave() -> anyhow::Result<()> {
        let worker = FakeWorker::default();
        let submitter = Arc::new(worker.submitter());

        let mut handles = Vec::new();
        for i in 0..8 {
            let submitter = submitter.clone();
            handles.push(tokio::spawn(async move {
                submitter.submit(&envelope(&format!("img-{}.png", i))).await
            }));
        }

        for handle in handles {
            handle.await??;
        }

        let wire = worker.wire.lock().unwrap().clone();
        assert_eq!(wire.len(), 16);
        for pair in wire.chunks(2) {
            let request = pair[0].strip_prefix("request:").expect("request first");
            let reply = pair[1].strip_prefix("reply:").expect("reply second");
            assert_eq!(request, reply);
        }

        assert_eq!(worker.connects.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_exchange_reconnects_on_next_submit() -> anyhow::Result<()> {
        let worker = FakeWorker::with_replies([Reply::Fail, Reply::accept()]);
        let submitter = worker.submitter();

        let err = submitter.submit(&envelope("a.png")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(!submitter.is_connected().await);

        submitter.submit(&envelope("a.png")).await?;
        assert_eq!(worker.connects.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn silent_worker_times_out() {
        let worker = FakeWorker::with_replies([Reply::Hang]);
        let submitter = worker.submitter();

        let err = submitter.submit(&envelope("a.png")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(!submitter.is_connected().await);
    }

    #[tokio::test]
    async fn talks_to_a_real_zmq_worker() -> anyhow::Result<()> {
        use zeromq::{Socket, SocketRecv, SocketSend, ZmqMessage};

        let mut rep = zeromq::RepSocket::new();
        let endpoint = rep.bind("tcp://127.0.0.1:0").await?;

        let worker = tokio::spawn(async move {
            for _ in 0..2 {
                let request = rep.recv().await?;
                let raw: Vec<u8> = request.into_vec().into_iter().flat_map(|f| f.to_vec()).collect();
                let envelope = JobEnvelope::decode(&raw).expect("valid envelope");
                // The worker double encodes its confirmation.
                let reply = serde_json::to_vec(&format!(
                    r#"{{"is_ok": {}}}"#,
                    envelope.target_format == ImageFormat::Png,
                ))
                .expect("encodable");
                rep.send(ZmqMessage::from(reply)).await?;
            }
            Ok::<_, zeromq::ZmqError>(())
        });

        let submitter = JobSubmitter::new(
            Box::new(ZmqConnector::new(endpoint.to_string())),
            Duration::from_secs(5),
        );

        submitter.submit(&envelope("cat.png")).await?;

        let mut webp = envelope("cat.png");
        webp.target_format = ImageFormat::Webp;
        let err = submitter.submit(&webp).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);

        worker.await??;
        Ok(())
    }
}
