//! Per-session worker.
//!
//! Every session runs on its own OS thread with a single-threaded tokio
//! runtime, so one session's emulation never shares a thread with another
//! session's. The connection task talks to the worker only through two
//! channels: raw client frames in, encoded server frames out. Dropping the
//! [`SessionHandle`] closes the inbound channel, which stops the worker and
//! releases the core together with its timers.

use log::{error, info};
use std::io;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use super::access::SessionId;
use super::autosave;
use super::protocol::ServerMessage;
use super::scheduler::{tick_period, FrameTicker};
use super::session::Session;

/// Connection-side end of a session worker.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    inbound: UnboundedSender<Vec<u8>>,
    outbound: UnboundedReceiver<Vec<u8>>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queues a raw client frame. Returns `false` once the worker has stopped.
    pub fn send(&self, raw: Vec<u8>) -> bool {
        self.inbound.send(raw).is_ok()
    }

    /// Waits for the next encoded server frame.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.outbound.recv().await
    }

    /// Closes the session and waits for its thread to finish.
    pub fn join(mut self) {
        let thread = self.thread.take();
        drop(self);
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("Session worker thread panicked");
            }
        }
    }
}

/// Starts `session` on a dedicated thread.
///
/// # Returns
///
/// The handle used to feed the session and read its replies, or the error
/// from spawning the thread.
pub fn spawn_session(session: Session) -> io::Result<SessionHandle> {
    let id = session.id();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let thread = thread::Builder::new()
        .name(format!("session-{id}"))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Session {}: failed to build runtime: {}", id, e);
                    return;
                }
            };
            runtime.block_on(run_session(session, inbound_rx, outbound_tx));
        })?;

    Ok(SessionHandle {
        id,
        inbound: inbound_tx,
        outbound: outbound_rx,
        thread: Some(thread),
    })
}

/// Drives one session until its inbound channel closes or its outbound
/// receiver goes away.
///
/// Messages are handled one at a time in arrival order. Between messages the
/// worker runs scheduler ticks while a game is running and fires the
/// autosave once its quiescence window has elapsed.
pub async fn run_session(
    mut session: Session,
    mut inbound: UnboundedReceiver<Vec<u8>>,
    outbound: UnboundedSender<Vec<u8>>,
) {
    let id = session.id();
    info!("Started session worker {}", id);

    let mut ticker = FrameTicker::new(tick_period());
    loop {
        if session.is_running() {
            ticker.start();
        } else {
            ticker.stop();
        }
        let deadline = session.autosave_deadline();

        tokio::select! {
            message = inbound.recv() => {
                let Some(raw) = message else {
                    break;
                };
                if let Some(reply) = session.handle_raw(&raw) {
                    if !send(&outbound, id, &reply) {
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                session.tick(Instant::now());
            }
            _ = autosave::sleep_until(deadline) => {
                if let Some(save) = session.fire_autosave(Instant::now()) {
                    if !send(&outbound, id, &save) {
                        break;
                    }
                }
            }
        }
    }

    ticker.stop();
    drop(session);
    info!("Session worker {} stopped", id);
}

/// Encodes and queues a reply. Returns `false` when the connection is gone.
fn send(outbound: &UnboundedSender<Vec<u8>>, id: SessionId, message: &ServerMessage) -> bool {
    match message.encode() {
        Ok(bytes) => outbound.send(bytes).is_ok(),
        Err(e) => {
            error!("Session {}: failed to encode reply: {}", id, e);
            true
        }
    }
}
