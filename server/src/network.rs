//! Server network layer: TCP acceptor and per-connection workers

use crate::client_manager::{Outbound, OutboundSender};
use crate::config::ServerConfig;
use crate::dispatcher::{Dispatcher, Reply};
use log::{debug, error, info, warn};
use shared::{read_frame, write_frame, FrameError, Push};
use std::net::SocketAddr;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Duration};

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(1);

/// Main server coordinating the acceptor and the shared session
pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Binds the listener and builds a fresh session from `config`
    ///
    /// Nothing is accepted until `run` is awaited.
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Server {
            listener,
            dispatcher: Dispatcher::new(config),
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle onto the session and registry shared by every worker
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Handle that stops the accept loop and disconnects everyone
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown_tx: self.shutdown_tx.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }

    /// Accepts connections until shutdown is requested
    pub async fn run(&self) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let dispatcher = self.dispatcher.clone();
                            tokio::spawn(async move {
                                handle_connection(dispatcher, stream, addr).await;
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                },

                _ = shutdown_rx.changed() => {
                    info!("Server shutting down");
                    break;
                },
            }
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown_tx: watch::Sender<bool>,
    dispatcher: Dispatcher,
}

impl ShutdownHandle {
    /// Stops accepting, pushes the shutdown sentinel to every connection and
    /// closes them
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let frame = match Push::Shutdown.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode shutdown frame: {}", e);
                return;
            }
        };

        let clients = self.dispatcher.clients();
        let targets = clients.read().await.all_senders();
        for (client_id, sender) in &targets {
            if sender.send(Outbound::Frame(frame.clone())).is_err()
                || sender.send(Outbound::Close).is_err()
            {
                debug!("Client {} was already closing", client_id);
            }
        }
        info!("Sent shutdown to {} connections", targets.len());

        // workers unregister once their socket is closed
        let drained = timeout(SHUTDOWN_DRAIN, async {
            while !clients.read().await.is_empty() {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("Some connections were still open at shutdown");
        }
    }
}

/// Runs one connection until either side closes it
///
/// Frames are read and dispatched in order on this task. Everything written
/// to the socket, responses and pushes alike, goes through the outbound queue
/// drained by a separate writer task.
pub async fn handle_connection(dispatcher: Dispatcher, stream: TcpStream, addr: SocketAddr) {
    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let client_id = dispatcher
        .clients()
        .write()
        .await
        .add_client(addr, outbound_tx.clone());

    let mut writer = tokio::spawn(write_outbound(write_half, outbound_rx, client_id));
    let mut writer_finished = false;
    let mut reader = BufReader::new(read_half);

    loop {
        let read = tokio::select! {
            read = read_frame(&mut reader) => read,
            _ = &mut writer => {
                debug!("Client {} closed by the server", client_id);
                writer_finished = true;
                break;
            }
        };

        let reply = match read {
            Ok(Some(frame)) => dispatcher.handle_frame(client_id, &frame).await,
            Ok(None) => break,
            Err(FrameError::Malformed(e)) => dispatcher.reject(client_id, &e),
            Err(e) => {
                warn!("Client {} read failed: {}", client_id, e);
                break;
            }
        };

        match reply {
            Reply::Respond(response) => {
                if !queue(&outbound_tx, response.encode()) {
                    break;
                }
            }
            Reply::Deferred => {}
            Reply::Close(response) => {
                queue(&outbound_tx, response.encode());
                let _ = outbound_tx.send(Outbound::Close);
                break;
            }
        }
    }

    dispatcher.disconnect(client_id).await;
    drop(outbound_tx);
    if !writer_finished {
        if let Err(e) = writer.await {
            error!("Writer task for client {} failed: {}", client_id, e);
        }
    }
}

fn queue(outbound_tx: &OutboundSender, frame: String) -> bool {
    outbound_tx.send(Outbound::Frame(frame)).is_ok()
}

/// Drains a connection's outbound queue onto the socket
///
/// Ends on `Outbound::Close`, on a write error or once every sender is gone.
/// Dropping the write half shuts down the socket's write side.
async fn write_outbound(
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    client_id: u64,
) {
    while let Some(item) = outbound_rx.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if let Err(e) = write_frame(&mut write_half, &frame).await {
                    debug!("Client {} write failed: {}", client_id, e);
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
}
