//! Recording Worker Thread Implementation
//!
//! This module contains the loop that runs in its own thread and owns the
//! recording store. It communicates with the ingestion side only through
//! crossbeam channels.
//!
//! # Responsibilities
//!
//! - **Store ownership**: opens the store lazily on the first request and is
//!   the only code that touches it, so access is serialized by the loop
//! - **Request handling**: writes, full reads and exports
//! - **Error reporting**: every request gets exactly one response, success or
//!   error; nothing is retried here
//!
//! Requests are handled strictly in arrival order, which keeps write batches
//! for the same session in the order they were issued.

use crate::backend::protocol::{Envelope, Inbound, Request, Response};
use crate::error::{ChordsError, Result, ResultExt};
use crate::export::ExportEngine;
use crate::storage::RecordingStore;
use crossbeam_channel::{Receiver, Sender};
use std::path::PathBuf;

/// Where the worker's store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// SQLite database file
    File(PathBuf),
    /// Private in-memory database, discarded when the worker stops
    InMemory,
}

/// The worker that owns the recording store
pub struct RecordingWorker {
    location: StoreLocation,
    /// Opened on first use
    store: Option<RecordingStore>,
    /// Requests from the client
    request_rx: Receiver<Envelope<Inbound>>,
    /// Responses to the client
    response_tx: Sender<Envelope<Response>>,
    /// Requests handled so far
    handled: u64,
}

impl RecordingWorker {
    /// Create a new recording worker
    pub fn new(
        location: StoreLocation,
        request_rx: Receiver<Envelope<Inbound>>,
        response_tx: Sender<Envelope<Response>>,
    ) -> Self {
        Self {
            location,
            store: None,
            request_rx,
            response_tx,
            handled: 0,
        }
    }

    /// Run until the client hangs up
    pub fn run(mut self) {
        tracing::info!("Recording worker started ({:?})", self.location);

        while let Ok(envelope) = self.request_rx.recv() {
            let response = self.handle(envelope.body);
            let reply = Envelope {
                id: envelope.id,
                body: response,
            };
            if self.response_tx.send(reply).is_err() {
                tracing::debug!("Client dropped its response channel");
                break;
            }
        }

        tracing::info!("Recording worker stopped after {} requests", self.handled);
    }

    /// Handle a single request, always producing a response
    pub fn handle(&mut self, inbound: Inbound) -> Response {
        self.handled += 1;

        let request = match inbound {
            Inbound::Typed(request) => request,
            Inbound::Wire(text) => match Request::decode(&text) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("Rejected request: {}", e);
                    return Response::from_error(&e);
                }
            },
        };

        let action = request.action();
        tracing::debug!(action, "Handling request");
        match self.execute(request) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(action, error = %e, "Request failed");
                Response::from_error(&e)
            }
        }
    }

    fn execute(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::Write { data, filename } => {
                self.store()?
                    .write_batch(&filename, &data)
                    .with_context(|| format!("Failed to write to '{}'", filename))?;
                Ok(Response::Written { success: true })
            }
            Request::GetAllData => {
                let all_data = self
                    .store()?
                    .read_all()
                    .context("Failed to retrieve all data")?;
                Ok(Response::AllData { all_data })
            }
            Request::SaveAsZip { canvas_count } => {
                let store = self.store()?;
                let output = ExportEngine::new(store)
                    .export_all(canvas_count)
                    .context("Failed to create ZIP file")?;
                for skipped in &output.skipped {
                    tracing::warn!("{}", skipped);
                }
                Ok(Response::Archive {
                    zip_blob: output.bytes,
                })
            }
            Request::SaveDataByFilename {
                filename,
                canvas_count,
            } => {
                let store = self.store()?;
                let blob = ExportEngine::new(store).export_one(&filename, canvas_count)?;
                Ok(Response::Export { blob })
            }
        }
    }

    /// Get the store, opening it on first use
    ///
    /// A failed open is reported for the current request only; the next
    /// request tries again.
    fn store(&mut self) -> Result<&mut RecordingStore> {
        if self.store.is_none() {
            let store = match &self.location {
                StoreLocation::File(path) => RecordingStore::open(path)?,
                StoreLocation::InMemory => RecordingStore::open_in_memory()?,
            };
            self.store = Some(store);
        }
        self.store
            .as_mut()
            .ok_or_else(|| ChordsError::StoreUnavailable("Store is not open".to_string()))
    }
}
