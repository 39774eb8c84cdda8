//! Acquisition loop tying the live stream to the recording worker
//!
//! [`Acquisition`] is what a device reader feeds frames into. Each frame is
//! rendered and checked for loss by the dispatcher, then, while a session is
//! recording, queued in the [`FrameRecorder`]. Batches are submitted to the
//! worker without waiting; acknowledgements are collected later with
//! [`Acquisition::poll_acks`] so that storage latency never stalls the stream.

use std::collections::HashMap;

use crate::backend::{RequestId, Response, WorkerHandle};
use crate::backend::protocol::Request;
use crate::config::AppConfig;
use crate::error::Result;
use crate::stream::{LiveFrameDispatcher, RenderSurface};
use crate::types::{Frame, LossEvent};

use super::recorder::FrameRecorder;
use super::types::FlushBatch;

/// Running totals of detected loss
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossTally {
    /// Discontinuities seen
    pub gaps: u64,
    /// Estimated frames lost, assuming no gap spans a full counter cycle
    pub missing_frames: u64,
}

impl LossTally {
    pub fn record(&mut self, event: &LossEvent) {
        self.gaps += 1;
        self.missing_frames += u64::from(event.missing_frames());
    }
}

/// A write batch that has been submitted but not acknowledged
#[derive(Debug, Clone)]
struct PendingWrite {
    filename: String,
    frames: usize,
}

/// Ingestion side of the recorder
pub struct Acquisition<R> {
    dispatcher: LiveFrameDispatcher<R>,
    recorder: FrameRecorder,
    worker: WorkerHandle,
    tally: LossTally,
    /// Writes awaiting acknowledgement, by request id
    outstanding: HashMap<RequestId, PendingWrite>,
    frames_seen: u64,
    frames_stored: u64,
    failed_writes: u64,
}

impl<R: RenderSurface> Acquisition<R> {
    pub fn new(surface: Option<R>, worker: WorkerHandle, config: &AppConfig) -> Self {
        Self {
            dispatcher: LiveFrameDispatcher::new(surface, config.stream.counter_position),
            recorder: FrameRecorder::new(&config.recording),
            worker,
            tally: LossTally::default(),
            outstanding: HashMap::new(),
            frames_seen: 0,
            frames_stored: 0,
            failed_writes: 0,
        }
    }

    /// Replace the dispatcher, e.g. to attach a loss channel
    pub fn with_dispatcher(mut self, dispatcher: LiveFrameDispatcher<R>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Feed one device frame through the pipeline
    pub fn on_frame(&mut self, frame: Frame) -> Result<Option<LossEvent>> {
        self.frames_seen += 1;
        let loss = self.dispatcher.dispatch(&frame);
        if let Some(event) = &loss {
            self.tally.record(event);
        }
        if let Some(batch) = self.recorder.push(frame) {
            self.submit(batch)?;
        }
        Ok(loss)
    }

    /// Flush on the recorder's interval when no frames are arriving
    pub fn tick(&mut self) -> Result<()> {
        if let Some(batch) = self.recorder.tick() {
            self.submit(batch)?;
        }
        self.poll_acks();
        Ok(())
    }

    /// Start recording, returning the session key
    pub fn start_recording(&mut self, filename: Option<String>) -> String {
        self.recorder.start(filename).to_string()
    }

    /// Stop recording and wait until every write of the session is stored
    ///
    /// Returns the session key, or `None` when nothing was recording.
    pub fn stop_recording(&mut self) -> Result<Option<String>> {
        let Some((filename, remainder)) = self.recorder.stop() else {
            return Ok(None);
        };
        if let Some(batch) = remainder {
            self.submit(batch)?;
        }
        self.wait_for_acks()?;
        Ok(Some(filename))
    }

    fn submit(&mut self, batch: FlushBatch) -> Result<()> {
        // Keep the reply backlog short while the stream runs
        self.poll_acks();
        let pending = PendingWrite {
            filename: batch.filename.clone(),
            frames: batch.len(),
        };
        let id = self.worker.submit(Request::Write {
            data: batch.frames,
            filename: batch.filename,
        })?;
        self.outstanding.insert(id, pending);
        Ok(())
    }

    /// Collect write acknowledgements that have already arrived
    ///
    /// Returns how many were collected.
    pub fn poll_acks(&mut self) -> usize {
        let ready: Vec<(RequestId, Response)> = self
            .outstanding
            .keys()
            .copied()
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|id| self.worker.take(id).map(|r| (id, r)))
            .collect();

        let collected = ready.len();
        for (id, response) in ready {
            self.acknowledge(id, response);
        }
        collected
    }

    /// Block until every outstanding write is acknowledged
    pub fn wait_for_acks(&mut self) -> Result<()> {
        let mut ids: Vec<RequestId> = self.outstanding.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let response = self.worker.wait(id)?;
            self.acknowledge(id, response);
        }
        Ok(())
    }

    fn acknowledge(&mut self, id: RequestId, response: Response) {
        let Some(write) = self.outstanding.remove(&id) else {
            return;
        };
        match response.into_result() {
            Ok(_) => {
                self.frames_stored += write.frames as u64;
            }
            Err(e) => {
                self.failed_writes += 1;
                tracing::error!(
                    filename = %write.filename,
                    frames = write.frames,
                    "Write failed: {}",
                    e
                );
            }
        }
    }

    pub fn tally(&self) -> LossTally {
        self.tally
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Frames the store has acknowledged
    pub fn frames_stored(&self) -> u64 {
        self.frames_stored
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes
    }

    /// Writes submitted but not yet acknowledged
    pub fn outstanding_writes(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn dispatcher(&self) -> &LiveFrameDispatcher<R> {
        &self.dispatcher
    }

    /// The worker handle, for exports and reads
    pub fn handle(&mut self) -> &mut WorkerHandle {
        &mut self.worker
    }

    /// Give back the worker handle
    pub fn into_handle(self) -> WorkerHandle {
        self.worker
    }
}
