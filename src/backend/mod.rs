//! Worker boundary between the ingestion side and the recording store
//!
//! All store and export work runs on a dedicated thread so large
//! serialization and compression never stall the live stream. The two sides
//! share no memory; they talk only through crossbeam channels.
//!
//! # Architecture
//!
//! - [`Request`] / [`Response`] - Message bodies (see [`protocol`] for the JSON shapes)
//! - [`Envelope`] - Wraps each message with a correlation id
//! - [`RecordingWorker`] - Loop that owns the store and answers requests in order
//! - [`WorkerHandle`] - Client side: submits requests and matches responses by id
//!
//! Because responses carry the id of their request, several requests may be
//! outstanding at once; [`WorkerHandle`] buffers responses until they are
//! claimed.
//!
//! # Example
//!
//! ```ignore
//! use chords_recorder::backend::{spawn_worker, StoreLocation};
//!
//! let mut handle = spawn_worker(StoreLocation::InMemory, &config.worker)?;
//! handle.write_batch("rec1.csv", frames)?;
//! let zip = handle.export_all(config.stream.channel_count)?;
//! handle.shutdown()?;
//! ```

pub mod protocol;
pub mod worker;

pub use protocol::{Envelope, Inbound, Request, RequestId, Response};
pub use worker::{RecordingWorker, StoreLocation};

use crate::config::WorkerConfig;
use crate::error::{ChordsError, Result};
use crate::storage::IndexedRecord;
use crate::types::Frame;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, HashSet};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Create a worker and its client handle without starting a thread
///
/// Requests queue up to `queue_capacity`. Responses are unbounded so the
/// worker never waits on a client that has not read its replies yet.
pub fn worker_pair(location: StoreLocation, config: &WorkerConfig) -> (RecordingWorker, WorkerHandle) {
    let (req_tx, req_rx) = bounded(config.queue_capacity.max(1));
    let (resp_tx, resp_rx) = unbounded();

    let worker = RecordingWorker::new(location, req_rx, resp_tx);
    let handle = WorkerHandle::from_channels(
        req_tx,
        resp_rx,
        Duration::from_millis(config.response_timeout_ms),
    );
    (worker, handle)
}

/// Start a recording worker on its own thread
pub fn spawn_worker(location: StoreLocation, config: &WorkerConfig) -> Result<WorkerHandle> {
    let (worker, mut handle) = worker_pair(location, config);
    let thread = std::thread::Builder::new()
        .name("recording-worker".to_string())
        .spawn(move || worker.run())?;
    handle.thread = Some(thread);
    Ok(handle)
}

/// Client side of the worker boundary
pub struct WorkerHandle {
    /// `None` once shut down
    request_tx: Option<Sender<Envelope<Inbound>>>,
    response_rx: Receiver<Envelope<Response>>,
    next_id: RequestId,
    /// Responses received but not yet claimed
    pending: HashMap<RequestId, Response>,
    /// Requests whose caller gave up waiting; their replies are discarded
    abandoned: HashSet<RequestId>,
    /// How long `wait` blocks for one response
    timeout: Duration,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    fn from_channels(
        request_tx: Sender<Envelope<Inbound>>,
        response_rx: Receiver<Envelope<Response>>,
        timeout: Duration,
    ) -> Self {
        Self {
            request_tx: Some(request_tx),
            response_rx,
            next_id: 1,
            pending: HashMap::new(),
            abandoned: HashSet::new(),
            timeout,
            thread: None,
        }
    }

    fn stash(&mut self, envelope: Envelope<Response>) {
        if self.abandoned.remove(&envelope.id) {
            tracing::debug!("Discarding late response to request {}", envelope.id);
        } else {
            self.pending.insert(envelope.id, envelope.body);
        }
    }

    fn send(&mut self, body: Inbound) -> Result<RequestId> {
        let tx = self
            .request_tx
            .as_ref()
            .ok_or_else(|| ChordsError::Channel("Recording worker is shut down".to_string()))?;
        let id = self.next_id;
        tx.send(Envelope { id, body })
            .map_err(|_| ChordsError::Channel("Recording worker has stopped".to_string()))?;
        self.next_id += 1;
        Ok(id)
    }

    /// Queue a request without waiting for its response
    pub fn submit(&mut self, request: Request) -> Result<RequestId> {
        self.send(Inbound::Typed(request))
    }

    /// Queue a raw JSON request; the worker decodes it
    pub fn submit_raw(&mut self, text: impl Into<String>) -> Result<RequestId> {
        self.send(Inbound::Wire(text.into()))
    }

    /// Move every response that has already arrived into the pending buffer
    pub fn poll(&mut self) -> usize {
        let mut received = 0;
        while let Ok(envelope) = self.response_rx.try_recv() {
            self.stash(envelope);
            received += 1;
        }
        received
    }

    /// Claim a response if it has arrived, without blocking
    pub fn take(&mut self, id: RequestId) -> Option<Response> {
        self.poll();
        self.pending.remove(&id)
    }

    /// Number of responses received but not yet claimed
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Block until the response for `id` arrives
    ///
    /// On timeout the request is abandoned: its reply is dropped when it
    /// eventually arrives.
    pub fn wait(&mut self, id: RequestId) -> Result<Response> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(response) = self.pending.remove(&id) {
                return Ok(response);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(envelope) => self.stash(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    self.abandoned.insert(id);
                    return Err(ChordsError::Timeout(format!(
                        "No response to request {} within {:?}",
                        id, self.timeout
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ChordsError::Channel(
                        "Recording worker has stopped".to_string(),
                    ));
                }
            }
        }
    }

    /// Submit a request and wait for its response
    pub fn call(&mut self, request: Request) -> Result<Response> {
        let id = self.submit(request)?;
        self.wait(id)
    }

    /// Append frames to a session
    pub fn write_batch(&mut self, filename: impl Into<String>, frames: Vec<Frame>) -> Result<()> {
        let request = Request::Write {
            data: frames,
            filename: filename.into(),
        };
        match self.call(request)?.into_result()? {
            Response::Written { success: true } => Ok(()),
            Response::Written { success: false } => Err(ChordsError::StoreUnavailable(
                "Write was not applied".to_string(),
            )),
            other => Err(unexpected("write", &other)),
        }
    }

    /// Read every stored session
    pub fn read_all(&mut self) -> Result<Vec<IndexedRecord>> {
        match self.call(Request::GetAllData)?.into_result()? {
            Response::AllData { all_data } => Ok(all_data),
            other => Err(unexpected("getAllData", &other)),
        }
    }

    /// Export every session as a ZIP archive
    pub fn export_all(&mut self, channel_count: usize) -> Result<Vec<u8>> {
        let request = Request::SaveAsZip {
            canvas_count: channel_count,
        };
        match self.call(request)?.into_result()? {
            Response::Archive { zip_blob } => Ok(zip_blob),
            other => Err(unexpected("saveAsZip", &other)),
        }
    }

    /// Export one session as CSV
    pub fn export_one(&mut self, filename: impl Into<String>, channel_count: usize) -> Result<Vec<u8>> {
        let request = Request::SaveDataByFilename {
            filename: filename.into(),
            canvas_count: channel_count,
        };
        match self.call(request)?.into_result()? {
            Response::Export { blob } => Ok(blob),
            other => Err(unexpected("saveDataByFilename", &other)),
        }
    }

    /// Stop the worker once it has drained its queue, and wait for it
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.request_tx = None;
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| ChordsError::Channel("Recording worker panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("{}", e);
        }
    }
}

fn unexpected(action: &str, response: &Response) -> ChordsError {
    ChordsError::Channel(format!(
        "Unexpected response to '{}': {:?}",
        action, response
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            queue_capacity: 16,
            response_timeout_ms: 5_000,
        }
    }

    #[test]
    fn test_pipelined_requests_match_by_id() {
        let mut handle = spawn_worker(StoreLocation::InMemory, &test_config()).unwrap();

        let write = handle
            .submit(Request::Write {
                data: vec![Frame::new(vec![1.0, 0.0])],
                filename: "rec1".to_string(),
            })
            .unwrap();
        let missing = handle
            .submit(Request::SaveDataByFilename {
                filename: "other".to_string(),
                canvas_count: 1,
            })
            .unwrap();
        let read = handle.submit(Request::GetAllData).unwrap();

        // Claim out of order
        match handle.wait(read).unwrap() {
            Response::AllData { all_data } => assert_eq!(all_data.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            handle.wait(missing).unwrap(),
            Response::Error { kind: ErrorKind::NotFound, .. }
        ));
        assert_eq!(handle.wait(write).unwrap(), Response::Written { success: true });
        assert_eq!(handle.pending_len(), 0);

        handle.shutdown().unwrap();
    }

    #[test]
    fn test_wait_times_out_without_worker() {
        let config = WorkerConfig {
            queue_capacity: 4,
            response_timeout_ms: 20,
        };
        let (_worker, mut handle) = worker_pair(StoreLocation::InMemory, &config);
        let id = handle.submit(Request::GetAllData).unwrap();
        let err = handle.wait(id).unwrap_err();
        assert!(matches!(err, ChordsError::Timeout(_)));
    }

    #[test]
    fn test_late_reply_after_timeout_is_discarded() {
        let (req_tx, _req_rx) = bounded(4);
        let (resp_tx, resp_rx) = unbounded();
        let mut handle = WorkerHandle::from_channels(req_tx, resp_rx, Duration::from_millis(20));

        let id = handle.submit(Request::GetAllData).unwrap();
        assert!(matches!(handle.wait(id), Err(ChordsError::Timeout(_))));

        resp_tx
            .send(Envelope { id, body: Response::Written { success: true } })
            .unwrap();
        assert_eq!(handle.poll(), 1);
        assert_eq!(handle.pending_len(), 0);
        assert!(handle.take(id).is_none());
    }

    #[test]
    fn test_unread_replies_do_not_stall_worker() {
        let config = WorkerConfig {
            queue_capacity: 2,
            response_timeout_ms: 5_000,
        };
        let mut handle = spawn_worker(StoreLocation::InMemory, &config).unwrap();

        // Far more requests than either queue holds, none read until the end
        let ids: Vec<_> = (0..40)
            .map(|i| {
                handle
                    .submit(Request::Write {
                        data: vec![Frame::new(vec![f64::from(i), 0.0])],
                        filename: "rec1".to_string(),
                    })
                    .unwrap()
            })
            .collect();
        for id in ids {
            assert_eq!(handle.wait(id).unwrap(), Response::Written { success: true });
        }
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_stopped_worker_is_reported() {
        let (worker, mut handle) = worker_pair(StoreLocation::InMemory, &test_config());
        drop(worker);
        assert!(matches!(
            handle.submit(Request::GetAllData),
            Err(ChordsError::Channel(_))
        ));
    }

    #[test]
    fn test_typed_helpers() {
        let mut handle = spawn_worker(StoreLocation::InMemory, &test_config()).unwrap();
        assert!(matches!(handle.export_all(1), Err(ChordsError::NoData)));

        handle
            .write_batch("rec1", vec![Frame::new(vec![1.0, 2.0, 3.0, 0.0])])
            .unwrap();
        let csv = handle.export_one("rec1", 3).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "Counter,Channel1,Channel2,Channel3\n1,2,3,0"
        );
        assert!(!handle.export_all(3).unwrap().is_empty());
    }
}
