//! Client receive pipeline.
//!
//! Two tasks joined by an unbounded queue:
//!   receiver : network → queue, the only producer
//!   presenter: queue → terminal, strictly in arrival order
//!
//! The receiver clears the running flag and drops the queue sender when the
//! connection ends, so the presenter drains what is left and exits.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use relay_core::io::read_packet;
use relay_core::Packet;

use crate::present::Presenter;

pub struct Pipeline {
    running: Arc<watch::Sender<bool>>,
    receiver: JoinHandle<()>,
    presenter: JoinHandle<()>,
}

impl Pipeline {
    /// Start the receiver on `reader` and the presenter on `presenter`.
    pub fn spawn<R, W>(reader: R, presenter: Presenter<W>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: Write + Send + 'static,
    {
        let (running_tx, running_rx) = watch::channel(true);
        let running = Arc::new(running_tx);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let receiver = tokio::spawn(receive_loop(reader, running.clone(), running_rx, queue_tx));
        let presenter = tokio::spawn(present_loop(queue_rx, presenter));

        Self {
            running,
            receiver,
            presenter,
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Watch the running flag, e.g. to notice the connection dropping.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Stop both tasks: clear the flag, shut the socket's write side, then
    /// join the receiver and the presenter, in that order.
    pub async fn shutdown<S>(self, writer: &mut S)
    where
        S: AsyncWrite + Unpin + ?Sized,
    {
        self.running.send_replace(false);

        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "socket shutdown failed");
        }

        if let Err(e) = self.receiver.await {
            tracing::warn!(error = %e, "receiver task failed");
        }
        if let Err(e) = self.presenter.await {
            tracing::warn!(error = %e, "presenter task failed");
        }
    }
}

async fn receive_loop<R>(
    mut reader: R,
    running: Arc<watch::Sender<bool>>,
    mut flag: watch::Receiver<bool>,
    queue: mpsc::UnboundedSender<Packet>,
) where
    R: AsyncRead + Unpin,
{
    while *flag.borrow_and_update() {
        tokio::select! {
            // Woken on every flag change; the loop condition re-checks it.
            _ = flag.changed() => {}

            result = read_packet(&mut reader) => match result {
                Ok(packet) => {
                    if queue.send(packet).is_err() {
                        break;
                    }
                }
                Err(e) if e.is_protocol_violation() => {
                    tracing::warn!(error = %e, "protocol violation from server");
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "connection closed");
                    break;
                }
            },
        }
    }

    running.send_replace(false);
    // `queue` drops here, which ends the presenter once it drains.
}

async fn present_loop<W: Write>(
    mut queue: mpsc::UnboundedReceiver<Packet>,
    mut presenter: Presenter<W>,
) {
    while let Some(packet) = queue.recv().await {
        if let Err(e) = presenter.present(&packet).await {
            tracing::warn!(error = %e, "failed to write output");
        }
    }
}
