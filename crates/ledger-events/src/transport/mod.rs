//! Transport channel adapter.
//!
//! A [`Connection`] owns one WebSocket session and exposes it as three read
//! ends plus an outbound sender:
//!
//! - `results`: raw inbound frames, in arrival order
//! - `errors`: terminal transport faults
//! - `done`: flips to `true` once the session has ended
//!
//! Socket I/O runs on two tasks owned by the connection (one reader, one
//! writer). There are no retries; a failed session stays failed.

mod memory;

pub use memory::{MemoryTransport, ServerEnd};

use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Outbound requests queued before the writer applies backpressure.
const OUTBOUND_CAPACITY: usize = 64;

/// Time given to the writer to flush and send a close frame on stop.
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Borrowed read ends of a connection, handed to one consumer at a time.
pub struct ReadEnds<'a> {
    pub results: &'a mut mpsc::Receiver<Bytes>,
    pub errors: &'a mut mpsc::Receiver<TransportError>,
    pub done: &'a mut watch::Receiver<bool>,
}

/// A live (or ended) session with the node's event endpoint.
pub struct Connection {
    endpoint: String,
    outbound: mpsc::Sender<String>,
    results: mpsc::Receiver<Bytes>,
    errors: mpsc::Receiver<TransportError>,
    done: watch::Receiver<bool>,
    done_tx: Arc<watch::Sender<bool>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Open a WebSocket session to `config.endpoint`.
    pub async fn start(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let handshake = connect_async(config.endpoint.as_str());
        let (stream, _response) = match tokio::time::timeout(config.timeout, handshake).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                return Err(ClientError::ConnectionFailed {
                    endpoint: config.endpoint.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ClientError::ConnectionFailed {
                    endpoint: config.endpoint.clone(),
                    reason: format!(
                        "handshake did not complete within {}ms",
                        config.timeout.as_millis()
                    ),
                })
            }
        };

        let (sink, stream) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (results_tx, results_rx) = mpsc::channel(config.channel_capacity);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(false);
        let done_tx = Arc::new(done_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader = tokio::spawn(read_loop(
            stream,
            results_tx,
            errors_tx,
            done_tx.clone(),
            shutdown_rx.clone(),
            config.max_frame_size,
        ));
        let writer = tokio::spawn(write_loop(sink, outbound_rx, shutdown_rx));

        info!(endpoint = %config.endpoint, "Connected to event endpoint");

        Ok(Self {
            endpoint: config.endpoint.clone(),
            outbound: outbound_tx,
            results: results_rx,
            errors: errors_rx,
            done: done_rx,
            done_tx,
            shutdown: shutdown_tx,
            tasks: vec![reader, writer],
        })
    }

    /// Assemble a connection from already-wired channels.
    pub(crate) fn from_parts(
        endpoint: String,
        outbound: mpsc::Sender<String>,
        results: mpsc::Receiver<Bytes>,
        errors: mpsc::Receiver<TransportError>,
        done_tx: Arc<watch::Sender<bool>>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        let done = done_tx.subscribe();
        Self {
            endpoint,
            outbound,
            results,
            errors,
            done,
            done_tx,
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Queue a text frame for the node.
    pub async fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.is_done() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Borrow the read ends for one consumer.
    pub fn read_ends(&mut self) -> ReadEnds<'_> {
        ReadEnds {
            results: &mut self.results,
            errors: &mut self.errors,
            done: &mut self.done,
        }
    }

    /// Whether the session has ended.
    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Observer of the done signal.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done.clone()
    }

    /// Close the session. Idempotent.
    ///
    /// Queued outbound frames are flushed and a close frame is sent before
    /// the socket tasks exit.
    pub async fn stop(&mut self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.done_tx.send_replace(true);

        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                debug!(endpoint = %self.endpoint, "Socket task did not exit in time, aborting");
                abort.abort();
            }
        }

        info!(endpoint = %self.endpoint, "Connection stopped");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Resolves once `done` reads `true` (or its sender is gone).
pub(crate) async fn session_ended(done: &mut watch::Receiver<bool>) {
    let _ = done.wait_for(|ended| *ended).await;
}

async fn read_loop<S>(
    mut stream: S,
    results: mpsc::Sender<Bytes>,
    errors: mpsc::Sender<TransportError>,
    done: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
    max_frame_size: usize,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = session_ended(&mut shutdown) => break,
            message = stream.next() => message,
        };

        let frame = match message {
            Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Some(Ok(Message::Binary(data))) => data,
            // Pongs are queued by tungstenite itself.
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Node closed the session");
                break;
            }
            Some(Err(e)) => {
                error!(error = %e, "WebSocket read failed");
                let _ = errors.try_send(TransportError::Socket(e.to_string()));
                break;
            }
            None => break,
        };

        if frame.len() > max_frame_size {
            error!(size = frame.len(), limit = max_frame_size, "Inbound frame too large");
            let _ = errors.try_send(TransportError::FrameTooLarge {
                size: frame.len(),
                limit: max_frame_size,
            });
            break;
        }

        // A full queue holds the reader back until the consumer catches up
        // or the connection is stopped.
        tokio::select! {
            sent = results.send(frame) => {
                if sent.is_err() {
                    break;
                }
            }
            _ = session_ended(&mut shutdown) => break,
        }
    }

    done.send_replace(true);
    debug!("Reader finished");
}

async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!(error = %e, "WebSocket write failed");
                        return;
                    }
                }
                None => break,
            },
            _ = session_ended(&mut shutdown) => break,
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    debug!("Writer finished");
}
