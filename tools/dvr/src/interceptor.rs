//! `Transport` wrapper that records, replays or passes through each call.

use crate::controller::{ActiveMode, ModeController};
use crate::errors::DvrError;
use crate::http::{HttpRequest, HttpResponse};
use crate::interaction::InteractionRecord;
use crate::logging::emit;
use crate::runtime::Transport;
use crate::store::Store;
use serde_json::json;
use std::sync::Arc;

pub struct Interceptor {
    controller: Arc<ModeController>,
    inner: Arc<dyn Transport>,
}

impl Interceptor {
    /// `inner` is the real transport used when recording or passing through.
    pub fn new(controller: Arc<ModeController>, inner: Arc<dyn Transport>) -> Self {
        Self { controller, inner }
    }

    pub fn controller(&self) -> &Arc<ModeController> {
        &self.controller
    }

    fn record(&self, store: &Store, mut request: HttpRequest) -> Result<HttpResponse, DvrError> {
        // A finished recording must not send traffic it can no longer keep.
        store.ensure_writable()?;
        let mut record = InteractionRecord::from_live_request(&mut request)?;
        let mut response = self.inner.round_trip(request)?;
        record.capture_response(&mut response, self.controller.reference_unix_ms())?;
        emit(self.controller.logger(), "info", "dvr.record", || {
            json!({
                "method": record.method(),
                "url": record.url_string(),
                "status": response.status,
                "fingerprint": record.request_fingerprint(),
            })
        });
        store.append(record)?;
        Ok(response)
    }

    fn replay(&self, store: &Store, mut request: HttpRequest) -> Result<HttpResponse, DvrError> {
        let live = InteractionRecord::from_live_request(&mut request)?;
        match store.find_and_consume(&live) {
            Some(found) => {
                emit(self.controller.logger(), "info", "dvr.replay.hit", || {
                    json!({
                        "method": live.method(),
                        "url": live.url_string(),
                        "status": found.status(),
                        "remaining": store.remaining(),
                    })
                });
                Ok(found.to_response())
            }
            None => {
                emit(self.controller.logger(), "warn", "dvr.replay.miss", || {
                    json!({
                        "method": live.method(),
                        "url": live.url_string(),
                        "fingerprint": live.request_fingerprint(),
                    })
                });
                Err(DvrError::ReplayMiss {
                    method: request.method,
                    url: live.url_string(),
                })
            }
        }
    }
}

impl Transport for Interceptor {
    fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, DvrError> {
        let active = self.controller.initialize()?;
        match active.as_ref() {
            ActiveMode::Record(store) => self.record(store, request),
            ActiveMode::Replay(store) => self.replay(store, request),
            ActiveMode::Passthrough => self.inner.round_trip(request),
        }
    }
}
