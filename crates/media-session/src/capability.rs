//! Capability negotiation.
//!
//! Loads the router's RTP capabilities into the local media engine once per
//! join and gates every transport, produce and consume operation on it.

use crate::errors::SessionError;
use crate::media::MediaEngine;
use signaling_protocol::RtpCapabilities;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Ready/not-ready gate over the local media engine.
pub struct CapabilityNegotiator {
    engine: Arc<dyn MediaEngine>,
    ready: AtomicBool,
}

impl CapabilityNegotiator {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            ready: AtomicBool::new(false),
        }
    }

    /// Load router capabilities. Failure is a join failure.
    pub async fn negotiate(&self, router_capabilities: &RtpCapabilities) -> Result<(), SessionError> {
        if self.is_ready() {
            return Ok(());
        }

        if let Err(e) = self.engine.load(router_capabilities).await {
            warn!(target: "ms.capability", error = %e, "Media device failed to load");
            return Err(SessionError::JoinFailure(format!(
                "capability negotiation failed: {e}"
            )));
        }

        self.ready.store(true, Ordering::SeqCst);
        info!(target: "ms.capability", "Media device loaded");
        Ok(())
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Fail fast if the device is not loaded yet.
    pub fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SessionError::DeviceNotReady)
        }
    }

    /// Local receive capabilities, sent with every consume request.
    pub fn rtp_capabilities(&self) -> Result<RtpCapabilities, SessionError> {
        self.ensure_ready()?;
        self.engine
            .rtp_capabilities()
            .ok_or(SessionError::DeviceNotReady)
    }

    pub(crate) fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }
}
