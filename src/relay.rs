//! Stream relay: native preview callback → consumer.
//!
//! The SDK calls back on its own threads. [`RelayGate`] is what those
//! threads see: it tags each buffer, enforces header-first ordering, feeds
//! the optional PlayCtrl decoder and forwards the frame to a [`FrameSink`].
//! Sinks are the only way frames cross into the async side.
//!
//! ```text
//!   SDK thread ──► RelayGate::on_native ──► FrameSink::deliver
//!                     │                        ├─ FrameRing   (bounded, async next())
//!                     └─► PlayCtrl (optional)  ├─ CallbackSink (plain closure)
//!                                              └─ LoopSink    (ordered async handler)
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::sdk::{FrameKind, PlayCtrl, RawFrameCallback};

/// PlayCtrl source buffer size handed to `PlayM4_OpenStream`.
const DECODE_POOL_SIZE: u32 = 1024 * 1024;

/// One buffer from the preview stream.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    /// Position within the streaming session, starting at 0 for the header.
    pub seq:  u64,
    pub data: Bytes,
}

/// Receiver of relayed frames. `deliver` runs on SDK threads.
pub trait FrameSink: Send + Sync {
    fn deliver(&self, frame: Frame);

    /// No more frames will follow; wake any waiting consumer.
    fn close(&self) {}
}

// ── FrameRing ────────────────────────────────────────────────────────────────

struct RingState {
    header:       Option<Frame>,
    header_taken: bool,
    payload:      VecDeque<Frame>,
    closed:       bool,
}

/// Bounded frame queue with a loop-safe wake.
///
/// The system header sits in its own slot and is always handed out first.
/// When `capacity` payload frames are queued, the oldest one is dropped to
/// make room.
pub struct FrameRing {
    state:    Mutex<RingState>,
    notify:   Notify,
    capacity: usize,
    dropped:  AtomicU64,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RingState {
                header:       None,
                header_taken: false,
                payload:      VecDeque::with_capacity(capacity.max(1)),
                closed:       false,
            }),
            notify:   Notify::new(),
            capacity: capacity.max(1),
            dropped:  AtomicU64::new(0),
        })
    }

    pub fn try_next(&self) -> Option<Frame> {
        let mut st = self.state.lock();
        if !st.header_taken {
            if let Some(h) = st.header.take() {
                st.header_taken = true;
                return Some(h);
            }
        }
        st.payload.pop_front()
    }

    /// Next frame, waiting if none is queued. `None` once the ring is
    /// closed and drained.
    pub async fn next(&self) -> Option<Frame> {
        loop {
            let notified = self.notify.notified();
            if let Some(f) = self.try_next() {
                return Some(f);
            }
            if self.state.lock().closed {
                return None;
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Payload frames discarded because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for FrameRing {
    fn deliver(&self, frame: Frame) {
        {
            let mut st = self.state.lock();
            if st.closed {
                return;
            }
            if frame.kind.is_header() {
                if st.header.is_none() && !st.header_taken {
                    st.header = Some(frame);
                }
            } else {
                if st.payload.len() >= self.capacity {
                    st.payload.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                st.payload.push_back(frame);
            }
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

// ── CallbackSink ─────────────────────────────────────────────────────────────

/// Forwards every frame to a closure on the SDK thread.
pub struct CallbackSink<F>(F);

impl<F> CallbackSink<F>
where
    F: Fn(Frame) + Send + Sync,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self(f))
    }
}

impl<F> FrameSink for CallbackSink<F>
where
    F: Fn(Frame) + Send + Sync,
{
    fn deliver(&self, frame: Frame) {
        (self.0)(frame)
    }
}

// ── LoopSink ─────────────────────────────────────────────────────────────────

/// Runs an async handler on a tokio runtime, one frame at a time, in order.
pub struct LoopSink {
    ring: Arc<FrameRing>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LoopSink {
    pub fn spawn<F, Fut>(handle: &tokio::runtime::Handle, capacity: usize, mut handler: F) -> Arc<Self>
    where
        F:   FnMut(Frame) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ring = FrameRing::new(capacity);
        let consumer = Arc::clone(&ring);
        let task = handle.spawn(async move {
            while let Some(frame) = consumer.next().await {
                handler(frame).await;
            }
        });
        Arc::new(Self { ring, task: Mutex::new(Some(task)) })
    }

    /// Wait until the handler has seen every frame delivered before close.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("stream handler task failed: {e}");
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.ring.dropped()
    }
}

impl FrameSink for LoopSink {
    fn deliver(&self, frame: Frame) {
        self.ring.deliver(frame);
    }

    fn close(&self) {
        self.ring.close();
    }
}

// ── RelayGate ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub delivered:      u64,
    pub bytes:          u64,
    /// Payload that arrived before the system header.
    pub early_dropped:  u64,
    pub repeat_headers: u64,
}

struct GateState {
    header_seen: bool,
    closed:      bool,
    next_seq:    u64,
    stats:       RelayStats,
    decode_port: Option<i32>,
}

/// Per-stream state shared between the SDK callback and the session.
pub struct RelayGate {
    sink:     Arc<dyn FrameSink>,
    playctrl: Option<Arc<dyn PlayCtrl>>,
    state:    Mutex<GateState>,
}

impl RelayGate {
    pub fn new(sink: Arc<dyn FrameSink>, playctrl: Option<Arc<dyn PlayCtrl>>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            playctrl,
            state: Mutex::new(GateState {
                header_seen: false,
                closed:      false,
                next_seq:    0,
                stats:       RelayStats::default(),
                decode_port: None,
            }),
        })
    }

    /// Closure to register with `NetSdk::real_play`.
    pub fn callback(self: &Arc<Self>) -> RawFrameCallback {
        let gate = Arc::clone(self);
        Arc::new(move |kind, data| gate.on_native(kind, data))
    }

    /// Handle one native buffer. Delivery happens under the gate lock so
    /// nothing reaches the sink after [`RelayGate::shutdown`].
    pub fn on_native(&self, kind: FrameKind, data: &[u8]) {
        let mut st = self.state.lock();
        if st.closed {
            return;
        }
        if kind.is_header() {
            if st.header_seen {
                st.stats.repeat_headers += 1;
                return;
            }
            st.header_seen = true;
            st.decode_port = self.open_decoder(data);
        } else if !st.header_seen {
            st.stats.early_dropped += 1;
            return;
        } else if let (Some(port), Some(pc)) = (st.decode_port, &self.playctrl) {
            if !pc.input_data(port, data) {
                debug!("PlayM4_InputData failed on port {port}: error {}", pc.last_error(port));
            }
        }

        let frame = Frame { kind, seq: st.next_seq, data: Bytes::copy_from_slice(data) };
        st.next_seq += 1;
        st.stats.delivered += 1;
        st.stats.bytes += data.len() as u64;
        self.sink.deliver(frame);
    }

    fn open_decoder(&self, header: &[u8]) -> Option<i32> {
        let pc = self.playctrl.as_ref()?;
        let port = match pc.get_port() {
            Some(p) => p,
            None => {
                warn!("PlayM4_GetPort failed, decoding disabled for this stream");
                return None;
            }
        };
        if !pc.open_stream(port, header, DECODE_POOL_SIZE) {
            warn!("PlayM4_OpenStream failed on port {port}: error {}", pc.last_error(port));
            pc.free_port(port);
            return None;
        }
        if !pc.play(port) {
            warn!("PlayM4_Play failed on port {port}: error {}", pc.last_error(port));
        }
        Some(port)
    }

    /// Close the sink and release the decode port. Idempotent.
    pub fn shutdown(&self) {
        let mut st = self.state.lock();
        if st.closed {
            return;
        }
        st.closed = true;
        self.sink.close();
        if let (Some(port), Some(pc)) = (st.decode_port.take(), &self.playctrl) {
            pc.stop(port);
            pc.close_stream(port);
            pc.free_port(port);
        }
        info!(
            "relay closed: {} frames, {} bytes, {} early, {} repeat headers",
            st.stats.delivered, st.stats.bytes, st.stats.early_dropped, st.stats.repeat_headers
        );
    }

    pub fn stats(&self) -> RelayStats {
        self.state.lock().stats
    }

    /// Whether this gate feeds exactly `sink`.
    pub fn delivers_to(&self, sink: &Arc<dyn FrameSink>) -> bool {
        Arc::as_ptr(&self.sink) as *const () == Arc::as_ptr(sink) as *const ()
    }

    #[cfg(test)]
    fn decode_port(&self) -> Option<i32> {
        self.state.lock().decode_port
    }
}
