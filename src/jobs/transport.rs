use async_trait::async_trait;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::error::{Error, Result};

/// A connected, strictly request/reply channel to the worker.
///
/// Implementations must not be used for a second request before the reply
/// to the first one was received, the submitter enforces this.
#[async_trait]
pub trait WorkerTransport: Send + 'static {
    /// Sends one request message and waits for exactly one reply message.
    async fn exchange(&mut self, request: Vec<u8>) -> Result<Vec<u8>>;
}

/// Opens channels to the worker.
#[async_trait]
pub trait WorkerConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn WorkerTransport>>;

    /// A human readable description of where this connects to.
    fn endpoint(&self) -> &str;
}

/// Connects ZeroMQ REQ sockets to the worker's REP socket.
pub struct ZmqConnector {
    endpoint: String,
}

impl ZmqConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl WorkerConnector for ZmqConnector {
    async fn connect(&self) -> Result<Box<dyn WorkerTransport>> {
        let mut socket = ReqSocket::new();
        socket.connect(&self.endpoint).await.map_err(|e| {
            Error::Transport(format!("failed to connect to worker @ {}: {}", self.endpoint, e))
        })?;

        debug!("Connected to worker @ {}", &self.endpoint);
        Ok(Box::new(ZmqTransport { socket }))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

pub struct ZmqTransport {
    socket: ReqSocket,
}

#[async_trait]
impl WorkerTransport for ZmqTransport {
    async fn exchange(&mut self, request: Vec<u8>) -> Result<Vec<u8>> {
        self.socket
            .send(ZmqMessage::from(request))
            .await
            .map_err(|e| Error::Transport(format!("failed to send job: {}", e)))?;

        let reply = self
            .socket
            .recv()
            .await
            .map_err(|e| Error::Transport(format!("failed to receive confirmation: {}", e)))?;

        Ok(reply
            .into_vec()
            .into_iter()
            .flat_map(|frame| frame.to_vec())
            .collect())
    }
}
