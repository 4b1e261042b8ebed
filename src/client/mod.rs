// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The client request lifecycle: at most one request in flight,
//! finalized exactly once.
//!
//! Finalization can be triggered from three independent places: a
//! matching response arriving off the transport, the transport
//! reporting a send failure, or the timeout timer firing. Only one of
//! them may win. The actual guarantee comes from
//! `state: Mutex<Option<PendingRequest>>` — whichever caller succeeds
//! in `.take()`-ing a `Some` owns the finalization, every other caller
//! sees `None` and no-ops. Everything else layered on top
//! (`callback_disarmed`, `Timer::kill`'s confirmed outcome) exists to
//! avoid doing needless work once the winner is known, not to provide
//! the guarantee itself — `Timer::kill` can report `StoppedNoAck` and
//! the mutex take is still what keeps that safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::error::{ClientError, Error};
use crate::frame::{Address, Frame, FrameType, FunctionCode, Quantity, SlaveId};
use crate::timer::Timer;
use crate::transport::Transport;

/// How much longer a synchronous [`Client::call`] waits beyond the
/// configured timeout before giving up on its own — the timer path
/// should always win this race, this is only a backstop.
const SYNC_WAIT_EPSILON: Duration = Duration::from_millis(30);

/// Bound on how long `Timer::kill` is allowed to block finalization
/// while it tries to confirm the timer task's fate.
const TIMER_KILL_FENCE: Duration = Duration::from_millis(20);

/// Client-side tunables.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// How long to wait for a response before finalizing with
    /// [`ClientError::Timeout`].
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
        }
    }
}

/// Where a finalized result is delivered. Exactly one variant is used
/// per request.
enum Sink {
    /// A synchronous caller awaiting a oneshot channel.
    Sync(oneshot::Sender<crate::Result<Frame>>),
    /// A caller-supplied completion callback.
    Callback(Box<dyn FnOnce(crate::Result<Frame>) + Send>),
    /// A shared cell a caller polls at its own pace.
    Tracker(Arc<Mutex<Option<crate::Result<Frame>>>>),
}

async fn dispatch(sink: Sink, outcome: crate::Result<Frame>) {
    match sink {
        Sink::Sync(tx) => {
            let _ = tx.send(outcome);
        }
        Sink::Callback(cb) => cb(outcome),
        Sink::Tracker(cell) => *cell.lock().await = Some(outcome),
    }
}

struct PendingRequest {
    fc: FunctionCode,
    slave_id: SlaveId,
    reg_address: Address,
    reg_count: Quantity,
    sink: Sink,
    callback_disarmed: Arc<AtomicBool>,
    timer: Timer,
}

impl PendingRequest {
    fn matches(&self, frame: &Frame, catch_all: bool) -> bool {
        frame.frame_type == FrameType::Response
            && frame.slave_id != 0
            && (catch_all || frame.slave_id == self.slave_id)
            && frame.fc == self.fc
    }
}

enum Outcome {
    Response(Frame),
    Failure(ClientError),
}

impl Outcome {
    fn resolve(self, pending: &PendingRequest) -> crate::Result<Frame> {
        match self {
            Self::Response(mut frame) => {
                // The wire form of a read response omits regAddress/regCount;
                // re-inject what the client itself requested.
                if pending.fc.is_read() {
                    frame.reg_address = pending.reg_address;
                    frame.reg_count = pending.reg_count;
                }
                Ok(frame)
            }
            Self::Failure(err) => Err(Error::Client(err)),
        }
    }
}

/// A single-in-flight Modbus request/response coordinator over a
/// [`Transport`].
#[derive(Debug)]
pub struct Client<T> {
    transport: T,
    config: ClientConfig,
    state: Mutex<Option<PendingRequest>>,
}

impl<T: Transport + 'static> Client<T> {
    /// Build a new client. Returned wrapped in `Arc` since the timer
    /// path needs a stable handle back to the client.
    #[must_use]
    pub fn new(transport: T, config: ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            config,
            state: Mutex::new(None),
        })
    }

    /// Whether a new request can be accepted right now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.try_lock().is_ok_and(|guard| guard.is_none())
    }

    /// Drive inbound frame processing. Must be polled (typically via
    /// `tokio::spawn`) for responses to ever reach a pending request.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.transport.recv_frame().await {
                Ok(frame) => self.on_frame(frame).await,
                Err(err) => {
                    log::warn!("client transport closed: {err}");
                    break;
                }
            }
        }
    }

    /// Send `request` and wait synchronously for the outcome.
    pub async fn call(self: &Arc<Self>, request: Frame) -> crate::Result<Frame> {
        let (tx, rx) = oneshot::channel();
        self.begin(request, Sink::Sync(tx)).await?;
        match tokio::time::timeout(self.config.timeout + SYNC_WAIT_EPSILON, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_recv_error)) | Err(_elapsed) => Err(Error::Client(ClientError::Timeout)),
        }
    }

    /// Send `request`, returning a cell the caller can poll for the
    /// outcome at its own pace.
    pub async fn call_tracked(
        self: &Arc<Self>,
        request: Frame,
    ) -> crate::Result<Arc<Mutex<Option<crate::Result<Frame>>>>> {
        let cell = Arc::new(Mutex::new(None));
        self.begin(request, Sink::Tracker(Arc::clone(&cell))).await?;
        Ok(cell)
    }

    /// Send `request`, invoking `callback` exactly once on finalization.
    pub async fn call_with_callback<F>(self: &Arc<Self>, request: Frame, callback: F) -> crate::Result<()>
    where
        F: FnOnce(crate::Result<Frame>) + Send + 'static,
    {
        self.begin(request, Sink::Callback(Box::new(callback))).await
    }

    async fn begin(self: &Arc<Self>, request: Frame, sink: Sink) -> crate::Result<()> {
        if request.frame_type != FrameType::Request || request.fc == FunctionCode::Null {
            return Err(Error::Client(ClientError::InvalidFrame));
        }

        {
            let mut guard = self.state.lock().await;
            if guard.is_some() {
                return Err(Error::Client(ClientError::Busy));
            }

            let callback_disarmed = Arc::new(AtomicBool::new(false));
            let timer_client = Arc::clone(self);
            let timer_disarmed = Arc::clone(&callback_disarmed);
            let timer = Timer::arm(self.config.timeout, async move {
                timer_client.on_timeout(timer_disarmed).await;
            });

            *guard = Some(PendingRequest {
                fc: request.fc,
                slave_id: request.slave_id,
                reg_address: request.reg_address,
                reg_count: request.reg_count,
                sink,
                callback_disarmed,
                timer,
            });
        }

        match self.transport.send_frame(&request).await {
            Ok(()) if request.slave_id == 0 => {
                // Broadcasts never elicit a reply; synthesize success now.
                let mut response = request;
                response.frame_type = FrameType::Response;
                self.finalize(Outcome::Response(response)).await;
            }
            Ok(()) => {}
            Err(_) => self.finalize(Outcome::Failure(ClientError::TxFailed)).await,
        }

        Ok(())
    }

    async fn on_frame(self: &Arc<Self>, frame: Frame) {
        let is_match = {
            let guard = self.state.lock().await;
            guard
                .as_ref()
                .is_some_and(|p| p.matches(&frame, self.transport.catch_all_slave_ids()))
        };
        if is_match {
            self.finalize(Outcome::Response(frame)).await;
        }
    }

    async fn on_timeout(self: Arc<Self>, callback_disarmed: Arc<AtomicBool>) {
        if callback_disarmed.load(Ordering::Acquire) {
            return;
        }
        // Best-effort: the outstanding request's transaction may still be
        // in flight on the wire. Give the transport a chance to tear it
        // down before the next request gets armed.
        self.transport.abort_current_transaction();
        self.finalize(Outcome::Failure(ClientError::Timeout)).await;
    }

    async fn finalize(self: &Arc<Self>, outcome: Outcome) {
        let pending = {
            let mut guard = self.state.lock().await;
            guard.take()
        };
        let Some(pending) = pending else {
            return;
        };

        pending.callback_disarmed.store(true, Ordering::Release);
        let kill_outcome = pending.timer.kill(TIMER_KILL_FENCE).await;
        log::trace!("client timer kill outcome: {kill_outcome:?}");

        let resolved = outcome.resolve(&pending);
        dispatch(pending.sink, resolved).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FunctionCode;
    use crate::transport::LoopbackTransport;

    fn read_request(slave_id: SlaveId, addr: Address, qty: Quantity) -> Frame {
        Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::ReadHoldingRegisters,
            slave_id,
            reg_address: addr,
            reg_count: qty,
            ..Frame::default()
        }
    }

    #[tokio::test]
    async fn round_trip_response_resolves_call() {
        let (client_t, server_t) = LoopbackTransport::pair(4, false);
        let client = Client::new(client_t, ClientConfig::default());
        tokio::spawn(Arc::clone(&client).run());

        let req = read_request(1, 100, 2);
        let call = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call(req).await }
        });

        let received = server_t.recv_frame().await.unwrap();
        assert_eq!(received.reg_address, 100);

        let mut response = Frame {
            frame_type: FrameType::Response,
            fc: FunctionCode::ReadHoldingRegisters,
            slave_id: 1,
            reg_count: 2,
            ..Frame::default()
        };
        response.set_registers(&[0x1234, 0x5678], Some(0));
        server_t.send_frame(&response).await.unwrap();

        let outcome = call.await.unwrap().unwrap();
        assert_eq!(outcome.reg_address, 100);
        assert_eq!(outcome.reg_count, 2);
        assert_eq!(outcome.get_register(0), 0x1234);
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn second_request_while_pending_is_busy() {
        let (client_t, _server_t) = LoopbackTransport::pair(4, false);
        let client = Client::new(client_t, ClientConfig::default());

        let _ = client.call_tracked(read_request(1, 0, 1)).await.unwrap();
        let err = client.call(read_request(1, 1, 1)).await.unwrap_err();
        assert_eq!(err, Error::Client(ClientError::Busy));
    }

    #[tokio::test]
    async fn unanswered_request_times_out_and_frees_the_client() {
        let (client_t, _server_t) = LoopbackTransport::pair(4, false);
        let client = Client::new(
            client_t,
            ClientConfig {
                timeout: Duration::from_millis(50),
            },
        );

        let start = std::time::Instant::now();
        let err = client.call(read_request(1, 0, 1)).await.unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(err, Error::Client(ClientError::Timeout));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed <= Duration::from_millis(200));
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn broadcast_write_resolves_immediately_without_a_reply() {
        let (client_t, _server_t) = LoopbackTransport::pair(4, false);
        let client = Client::new(client_t, ClientConfig::default());

        let mut req = Frame {
            frame_type: FrameType::Request,
            fc: FunctionCode::WriteMultipleRegisters,
            slave_id: 0,
            reg_address: 10,
            ..Frame::default()
        };
        req.set_registers(&[1, 2], Some(0));
        req.reg_count = 2;

        let outcome = client.call(req).await.unwrap();
        assert_eq!(outcome.reg_address, 10);
        assert_eq!(outcome.reg_count, 2);
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn malformed_request_is_rejected_before_arming() {
        let (client_t, _server_t) = LoopbackTransport::pair(4, false);
        let client = Client::new(client_t, ClientConfig::default());
        let err = client.call(Frame::default()).await.unwrap_err();
        assert_eq!(err, Error::Client(ClientError::InvalidFrame));
        assert!(client.is_ready());
    }
}
