//! Transport management.
//!
//! One send transport per session and one receive transport per remote
//! publisher group. Each transport runs its DTLS connect handshake exactly
//! once, lazily before its first produce or consume; a failed handshake is
//! remembered and never retried.

use crate::capability::CapabilityNegotiator;
use crate::errors::SessionError;
use crate::media::{MediaConsumer, MediaProducer, MediaTrack, MediaTransport};
use crate::observability::metrics;
use crate::producer::ProducerKind;
use crate::signaling::SignalingClient;
use common::types::{ProducerId, TransportId};
use signaling_protocol::{ConsumeAck, MediaKind, TransportDirection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Creates send and receive transports.
pub struct TransportManager {
    signaling: SignalingClient,
    negotiator: Arc<CapabilityNegotiator>,
}

impl TransportManager {
    pub fn new(signaling: SignalingClient, negotiator: Arc<CapabilityNegotiator>) -> Self {
        Self {
            signaling,
            negotiator,
        }
    }

    /// Request send transport parameters and construct the local channel.
    pub async fn create_send_transport(&self) -> Result<SendTransport, SessionError> {
        let link = self.create(TransportDirection::Send, None).await?;
        Ok(SendTransport {
            link: Arc::new(link),
        })
    }

    /// Create the receive transport for the group keyed by `audio_pid`.
    pub async fn create_receive_transport(
        &self,
        audio_pid: &ProducerId,
    ) -> Result<ReceiveTransport, SessionError> {
        let link = self
            .create(TransportDirection::Recv, Some(audio_pid.clone()))
            .await?;
        Ok(ReceiveTransport {
            link: Arc::new(link),
        })
    }

    async fn create(
        &self,
        direction: TransportDirection,
        audio_pid: Option<ProducerId>,
    ) -> Result<TransportLink, SessionError> {
        self.negotiator.ensure_ready()?;

        let setup_failure = |reason: String| SessionError::TransportSetupFailure {
            direction,
            reason,
        };

        let params = self
            .signaling
            .request_transport(direction, audio_pid.as_ref())
            .await
            .map_err(|e| setup_failure(e.to_string()))?;

        let transport = self
            .negotiator
            .engine()
            .create_transport(direction, &params)
            .await
            .map_err(|e| setup_failure(e.to_string()))?;

        info!(
            target: "ms.transport",
            direction = direction.as_str(),
            transport_id = %transport.id(),
            audio_pid = ?audio_pid,
            "Transport created"
        );

        Ok(TransportLink {
            transport,
            direction,
            audio_pid,
            signaling: self.signaling.clone(),
            negotiator: Arc::clone(&self.negotiator),
            state: Mutex::new(LinkState::New),
        })
    }
}

#[derive(Debug, Clone)]
enum LinkState {
    New,
    Connected,
    Failed(String),
}

/// A local transport plus its connect-handshake state.
struct TransportLink {
    transport: Arc<dyn MediaTransport>,
    direction: TransportDirection,
    audio_pid: Option<ProducerId>,
    signaling: SignalingClient,
    negotiator: Arc<CapabilityNegotiator>,
    state: Mutex<LinkState>,
}

impl TransportLink {
    fn connect_failure(&self, reason: String) -> SessionError {
        SessionError::TransportConnectFailure {
            direction: self.direction,
            reason,
        }
    }

    /// Run the DTLS handshake if it has not run yet.
    async fn ensure_connected(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        match &*state {
            LinkState::Connected => return Ok(()),
            LinkState::Failed(reason) => return Err(self.connect_failure(reason.clone())),
            LinkState::New => {}
        }

        if self.transport.is_closed() {
            return Err(self.connect_failure("transport closed".to_string()));
        }

        let result = self
            .signaling
            .connect_transport(
                self.transport.dtls_parameters(),
                self.direction,
                self.audio_pid.as_ref(),
            )
            .await;

        match result {
            Ok(()) => {
                *state = LinkState::Connected;
                metrics::record_transport_connect(self.direction.as_str(), "success");
                info!(
                    target: "ms.transport",
                    direction = self.direction.as_str(),
                    transport_id = %self.transport.id(),
                    "Transport connected"
                );
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                *state = LinkState::Failed(reason.clone());
                metrics::record_transport_connect(self.direction.as_str(), "error");
                warn!(
                    target: "ms.transport",
                    direction = self.direction.as_str(),
                    transport_id = %self.transport.id(),
                    error = %reason,
                    "Transport connect failed"
                );
                Err(self.connect_failure(reason))
            }
        }
    }

    fn close(&self) {
        if !self.transport.is_closed() {
            debug!(
                target: "ms.transport",
                direction = self.direction.as_str(),
                transport_id = %self.transport.id(),
                "Closing transport"
            );
            self.transport.close();
        }
    }
}

/// The session's single outbound transport.
#[derive(Clone)]
pub struct SendTransport {
    link: Arc<TransportLink>,
}

impl SendTransport {
    #[must_use]
    pub fn id(&self) -> &TransportId {
        self.link.transport.id()
    }

    /// Produce `track` as `kind`.
    ///
    /// The first call runs the connect handshake; a connect failure is
    /// returned as `TransportConnectFailure` and is fatal to streaming.
    /// Server rejection of this one producer is a `ProduceFailure`.
    pub async fn produce(
        &self,
        kind: ProducerKind,
        track: MediaTrack,
    ) -> Result<Arc<dyn MediaProducer>, SessionError> {
        let link = &self.link;
        link.negotiator.ensure_ready()?;
        link.ensure_connected().await?;

        let produce_failure = |reason: String| {
            metrics::record_producer_created(kind.as_str(), "error");
            SessionError::ProduceFailure { kind, reason }
        };

        let rtp_parameters = link
            .transport
            .rtp_parameters(&track)
            .map_err(|e| produce_failure(e.to_string()))?;

        let producer_id = link
            .signaling
            .start_producing(kind.media_kind(), rtp_parameters, kind.source())
            .await
            .map_err(|e| produce_failure(e.to_string()))?;

        let producer = link
            .transport
            .produce(producer_id, track)
            .await
            .map_err(|e| produce_failure(e.to_string()))?;

        metrics::record_producer_created(kind.as_str(), "success");
        Ok(producer)
    }

    pub fn close(&self) {
        self.link.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.link.transport.is_closed()
    }
}

/// Inbound transport owned by one remote publisher group.
#[derive(Clone)]
pub struct ReceiveTransport {
    link: Arc<TransportLink>,
}

impl ReceiveTransport {
    #[must_use]
    pub fn id(&self) -> &TransportId {
        self.link.transport.id()
    }

    /// Consume the remote producer `pid`.
    ///
    /// Server refusal (`cannotConsume`, `consumeFailed`), a local consume
    /// error or a failed unpause are all reported as `ConsumeFailure`. A
    /// failed connect handshake is `TransportConnectFailure` and fails every
    /// later consume on this transport.
    pub async fn consume(
        &self,
        pid: &ProducerId,
        kind: MediaKind,
    ) -> Result<Arc<dyn MediaConsumer>, SessionError> {
        let link = &self.link;
        let rtp_capabilities = link.negotiator.rtp_capabilities()?;

        let consume_failure = |reason: String| {
            metrics::record_consumer_created(kind.as_str(), "error");
            SessionError::ConsumeFailure {
                pid: pid.clone(),
                kind,
                reason,
            }
        };

        let params = match link
            .signaling
            .consume_media(rtp_capabilities, pid, kind)
            .await
        {
            Ok(ConsumeAck::Params(params)) => params,
            Ok(ConsumeAck::CannotConsume) => {
                return Err(consume_failure("cannotConsume".to_string()));
            }
            Ok(ConsumeAck::ConsumeFailed) => {
                return Err(consume_failure("consumeFailed".to_string()));
            }
            Err(e) => return Err(consume_failure(e.to_string())),
        };

        if let Err(e) = link.ensure_connected().await {
            metrics::record_consumer_created(kind.as_str(), "error");
            return Err(e);
        }

        let consumer = link
            .transport
            .consume(&params)
            .await
            .map_err(|e| consume_failure(e.to_string()))?;

        // Server-side consumers start paused
        if let Err(e) = link.signaling.unpause_consumer(pid, kind).await {
            consumer.close();
            return Err(consume_failure(e.to_string()));
        }

        metrics::record_consumer_created(kind.as_str(), "success");
        debug!(
            target: "ms.transport",
            pid = %pid,
            kind = kind.as_str(),
            consumer_id = %consumer.id(),
            "Consumer opened"
        );
        Ok(consumer)
    }

    pub fn close(&self) {
        self.link.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.link.transport.is_closed()
    }
}
