//! Async protocol client for the Potstop server
//!
//! A background task reads every frame the server sends and splits them into
//! responses, which answer this client's requests in order, and pushes, which
//! the server sends on its own.

use log::{debug, info, warn};
use shared::{
    read_frame, write_frame, AnswerSheet, Command, FrameError, ProtocolError, Push, Response,
    ServerFrame,
};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Long enough to cover the server's grace, collection and trailing waits
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("timed out waiting for the server")]
    Timeout,

    #[error("the server closed the connection")]
    Disconnected,

    #[error("could not connect after {attempts} attempts")]
    ConnectFailed { attempts: u32 },
}

pub struct Client {
    writer: OwnedWriteHalf,
    responses: mpsc::UnboundedReceiver<Response>,
    pushes: mpsc::UnboundedReceiver<Push>,
    reader: JoinHandle<()>,
    response_timeout: Duration,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        info!("Connected to {}", addr);

        let (read_half, writer) = stream.into_split();
        let (response_tx, responses) = mpsc::unbounded_channel();
        let (push_tx, pushes) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_frames(read_half, response_tx, push_tx));

        Ok(Self {
            writer,
            responses,
            pushes,
            reader,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    /// Connects, retrying up to `attempts` times with `delay` in between
    pub async fn connect_with_retry(
        addr: &str,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self, ClientError> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match Self::connect(addr).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    warn!(
                        "Connection attempt {}/{} to {} failed: {}",
                        attempt, attempts, addr, e
                    );
                    if attempt < attempts {
                        sleep(delay).await;
                    }
                }
            }
        }
        Err(ClientError::ConnectFailed { attempts })
    }

    pub fn with_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// Sends a command and waits for its response
    pub async fn send(&mut self, command: &Command) -> Result<Response, ClientError> {
        let frame = command.encode()?;
        write_frame(&mut self.writer, &frame).await?;
        debug!("Sent {}", command.keyword());

        match timeout(self.response_timeout, self.responses.recv()).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(ClientError::Disconnected),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    pub async fn join(&mut self, name: &str) -> Result<Response, ClientError> {
        self.send(&Command::Join {
            name: name.to_string(),
        })
        .await
    }

    pub async fn start(&mut self) -> Result<Response, ClientError> {
        self.send(&Command::Start).await
    }

    pub async fn stop(&mut self, answers: AnswerSheet) -> Result<Response, ClientError> {
        self.send(&Command::Stop { answers }).await
    }

    pub async fn quit(&mut self) -> Result<Response, ClientError> {
        self.send(&Command::Quit).await
    }

    /// Waits up to `wait` for the next push from the server
    pub async fn next_push(&mut self, wait: Duration) -> Result<Push, ClientError> {
        match timeout(wait, self.pushes.recv()).await {
            Ok(Some(push)) => Ok(push),
            Ok(None) => Err(ClientError::Disconnected),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Resolves with the next push, or `None` once the connection is gone
    pub async fn recv_push(&mut self) -> Option<Push> {
        self.pushes.recv().await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_frames(
    read_half: OwnedReadHalf,
    response_tx: mpsc::UnboundedSender<Response>,
    push_tx: mpsc::UnboundedSender<Push>,
) {
    let mut reader = BufReader::new(read_half);

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Server closed the connection");
                break;
            }
            Err(FrameError::Malformed(e)) => {
                warn!("Ignoring frame from server: {}", e);
                continue;
            }
            Err(e) => {
                warn!("Error reading from server: {}", e);
                break;
            }
        };

        let delivered = match ServerFrame::parse(&frame) {
            Ok(ServerFrame::Response(response)) => response_tx.send(response).is_ok(),
            Ok(ServerFrame::Push(push)) => push_tx.send(push).is_ok(),
            Err(e) => {
                warn!("Ignoring frame from server: {}", e);
                true
            }
        };
        if !delivered {
            break;
        }
    }
}
