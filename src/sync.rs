//! Frame bundling and the queue between the streams and the render loop.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::traits::{CaptureStream, Frame, FrameBundle, Result};

/// Default queue depth; draining into a one-slot queue leaves only the
/// newest bundle for the render loop.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

/// Collects one frame of every opened stream into a bundle.
///
/// Each stream has one pending slot; a bundle is emitted once every slot
/// is filled.
pub struct Syncer<S> {
    streams: Vec<S>,
    pending: Vec<Option<Frame>>,
}

impl<S: CaptureStream> Syncer<S> {
    /// Take ownership of the opened streams; they are read in kind order.
    pub fn new(mut streams: Vec<S>) -> Self {
        streams.sort_by_key(|stream| stream.profile().kind);
        let pending = streams.iter().map(|_| None).collect();
        Self { streams, pending }
    }

    /// Number of streams feeding the syncer.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Block until every stream delivered its next frame and push the bundle
    /// into `queue`.
    pub fn pump(&mut self, queue: &mut FrameQueue) -> Result<()> {
        for (stream, slot) in self.streams.iter_mut().zip(&mut self.pending) {
            if slot.is_none() {
                *slot = Some(stream.next_frame()?);
            }
        }
        queue.enqueue(self.take_bundle());
        Ok(())
    }

    /// Push every bundle that can be completed from frames already waiting,
    /// without blocking. Returns the number of bundles pushed.
    pub fn pump_ready(&mut self, queue: &mut FrameQueue) -> Result<usize> {
        if self.streams.is_empty() {
            return Ok(0);
        }
        let mut pushed = 0;
        loop {
            for (stream, slot) in self.streams.iter_mut().zip(&mut self.pending) {
                if slot.is_none() {
                    *slot = stream.try_next_frame()?;
                }
            }
            if self.pending.iter().any(Option::is_none) {
                return Ok(pushed);
            }
            queue.enqueue(self.take_bundle());
            pushed += 1;
        }
    }

    fn take_bundle(&mut self) -> FrameBundle {
        let mut bundle = FrameBundle::new();
        for frame in self.pending.iter_mut().filter_map(Option::take) {
            if frame.metadata.bytes_used == 0 || frame.data.is_empty() {
                warn!(
                    kind = %frame.kind,
                    sequence = frame.metadata.sequence,
                    "Dropping empty frame"
                );
                continue;
            }
            bundle.push(frame);
        }
        bundle
    }
}

/// Bounded FIFO of frame bundles that drops the oldest bundle when full.
#[derive(Debug)]
pub struct FrameQueue {
    bundles: VecDeque<FrameBundle>,
    capacity: usize,
    dropped: u64,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` bundles (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bundles: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append a bundle, evicting the oldest when full.
    pub fn enqueue(&mut self, bundle: FrameBundle) {
        if self.bundles.len() >= self.capacity {
            self.bundles.pop_front();
            self.dropped += 1;
            debug!(dropped = self.dropped, "Frame queue full, dropped oldest bundle");
        }
        self.bundles.push_back(bundle);
    }

    /// Take the oldest bundle without blocking.
    pub fn poll_for_frames(&mut self) -> Option<FrameBundle> {
        self.bundles.pop_front()
    }

    /// Queue every bundle `syncer` can complete right away, then take the
    /// oldest one, blocking on the streams when nothing is queued.
    pub fn wait_for_frames<S: CaptureStream>(&mut self, syncer: &mut Syncer<S>) -> Result<FrameBundle> {
        loop {
            syncer.pump_ready(self)?;
            if let Some(bundle) = self.poll_for_frames() {
                return Ok(bundle);
            }
            syncer.pump(self)?;
        }
    }

    /// Bundles currently queued.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Bundles evicted so far.
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}
