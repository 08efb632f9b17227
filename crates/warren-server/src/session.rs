//! One AMQP connection, from protocol header to close.
//!
//! The session owns the transport connection and the [`ConnectionState`].
//! Channel 0 carries the connection-class handshake, handled here; every
//! other channel is handed to the shared [`Dispatcher`]. Frames queued by
//! handlers are written after each inbound frame, in order.

use anyhow::{Context, Result};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};
use warren_core::error::reply_code;
use warren_core::{
    ConnectionContext, ConnectionState, Defect, DispatchError, InvalidReason, ProtocolViolation,
};
use warren_protocol::frame::FRAME_MIN_SIZE;
use warren_protocol::{
    FieldTable, Frame, FrameType, MethodBody, MethodKind, ProtocolInitiation, ProtocolVersion,
    TableValue,
};
use warren_transport::{Connection, TransportError};

use crate::metrics;
use crate::server::ServerState;

/// Connection-class handshake phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitStartOk,
    AwaitTuneOk,
    AwaitOpen,
    Open,
    /// The broker sent `connection.close` and waits for `close-ok`.
    Closing,
}

/// What the session does after handling a frame.
enum Next {
    Continue,
    Close,
}

/// A running AMQP connection.
pub struct Session {
    conn: Box<dyn Connection>,
    server: Arc<ServerState>,
    ctx: ConnectionState,
    phase: Phase,
    channels_reported: usize,
}

impl Session {
    /// Negotiate the protocol header and send `connection.start`.
    ///
    /// Returns `None` if the peer asked for a version the broker does not
    /// speak; the preferred header has then been sent back and the
    /// connection closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    pub async fn start(mut conn: Box<dyn Connection>, server: Arc<ServerState>) -> Result<Option<Self>> {
        let header = conn.recv_protocol_header().await?;
        let version = match ProtocolInitiation::decode(header) {
            Ok(v) if server.config.protocol.supported.contains(&v) => v,
            result => {
                let preferred = server.config.preferred_version();
                warn!(
                    connection = %conn.id(),
                    header = ?header,
                    result = ?result,
                    preferred = %preferred,
                    "Rejecting protocol header"
                );
                conn.send_protocol_header(ProtocolInitiation::for_version(preferred).encode())
                    .await?;
                conn.close().await?;
                return Ok(None);
            }
        };

        let ctx = ConnectionState::new(version, server.config.limits.frame_max)
            .context("Negotiated version has no method table")?;
        server
            .dispatcher
            .check_registry(ctx.method_registry())
            .context("Dispatcher incomplete for negotiated version")?;

        info!(connection = %conn.id(), version = %version, peer = ?conn.remote_addr(), "Protocol negotiated");

        let mut session = Self {
            conn,
            server,
            ctx,
            phase: Phase::AwaitStartOk,
            channels_reported: 0,
        };
        session.send_start()?;
        session.write_pending().await?;
        Ok(Some(session))
    }

    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.ctx.protocol_version()
    }

    /// Process frames until either side closes.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a broker defect.
    pub async fn run(mut self) -> Result<()> {
        let result = self.run_loop().await;
        let closed = self.ctx.close_all_channels();
        self.report_channels();
        if closed > 0 {
            debug!(connection = %self.conn.id(), channels = closed, "Released channels");
        }
        if self.conn.is_open() {
            if let Err(e) = self.conn.close().await {
                trace!(connection = %self.conn.id(), error = %e, "Close after session end failed");
            }
        }
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        loop {
            let frame = match self.conn.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(connection = %self.conn.id(), "Peer closed connection");
                    return Ok(());
                }
                Err(TransportError::Frame(e)) => {
                    warn!(connection = %self.conn.id(), error = %e, "Framing error");
                    metrics::record_violation(reply_code::FRAME_ERROR);
                    let close = self
                        .ctx
                        .method_registry()
                        .create_connection_close(reply_code::FRAME_ERROR, &e.to_string(), 0, 0)
                        .map_err(|source| Defect::BuildFailed {
                            method: "connection.close",
                            source,
                        })?;
                    self.ctx.write_frame(close.to_frame(0));
                    self.write_pending().await?;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            metrics::record_frame(frame.encoded_len(), "inbound");

            let next = match self.handle_frame(frame) {
                Ok(next) => next,
                Err(DispatchError::Violation(violation)) => self.close_for(&violation)?,
                Err(DispatchError::Defect(defect)) => {
                    error!(connection = %self.conn.id(), error = %defect, "Broker defect, dropping connection");
                    metrics::record_error("defect");
                    return Err(defect.into());
                }
            };
            self.report_channels();
            self.write_pending().await?;

            if let Next::Close = next {
                return Ok(());
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<Next, DispatchError> {
        if frame.is_heartbeat() {
            trace!(connection = %self.conn.id(), "Heartbeat");
            return Ok(Next::Continue);
        }
        if self.phase == Phase::Closing {
            // Everything but close and close-ok is discarded while closing.
            if frame.frame_type == FrameType::Method && frame.channel == 0 {
                return self.handle_closing(frame.payload);
            }
            return Ok(Next::Continue);
        }
        if frame.frame_type != FrameType::Method {
            return Err(ProtocolViolation::UnexpectedFrame {
                version: self.version(),
                channel: frame.channel,
                frame: match frame.frame_type {
                    FrameType::ContentHeader => "content header",
                    FrameType::ContentBody => "content body",
                    _ => "out-of-band",
                },
            }
            .into());
        }

        if frame.channel == 0 {
            return self.handle_connection_method(frame.payload);
        }
        if self.phase != Phase::Open {
            return Err(ProtocolViolation::UnexpectedFrame {
                version: self.version(),
                channel: frame.channel,
                frame: "method",
            }
            .into());
        }

        let start = Instant::now();
        let result = self
            .server
            .dispatcher
            .handle_method_frame(&mut self.ctx, frame.channel, frame.payload);
        metrics::record_dispatch(start.elapsed().as_secs_f64());
        result.map(|()| Next::Continue)
    }

    fn decode(&self, channel: u16, payload: Bytes) -> Result<MethodBody, DispatchError> {
        self.ctx
            .method_registry()
            .decode(payload)
            .map_err(|source| ProtocolViolation::Decode { channel, source }.into())
    }

    fn handle_closing(&mut self, payload: Bytes) -> Result<Next, DispatchError> {
        match self.ctx.method_registry().decode(payload) {
            Ok(body) if body.kind() == MethodKind::ConnectionCloseOk => {
                debug!(connection = %self.conn.id(), "Close confirmed");
                Ok(Next::Close)
            }
            Ok(body) if body.kind() == MethodKind::ConnectionClose => {
                self.reply(MethodKind::ConnectionCloseOk, self.registry().create_connection_close_ok())?;
                Ok(Next::Close)
            }
            _ => Ok(Next::Continue),
        }
    }

    fn handle_connection_method(&mut self, payload: Bytes) -> Result<Next, DispatchError> {
        let body = self.decode(0, payload)?;
        debug!(
            connection = %self.conn.id(),
            class = body.class_id(),
            method = body.method_id(),
            version = %body.version(),
            phase = ?self.phase,
            "Handling {}",
            body.name()
        );

        match (self.phase, body.kind()) {
            (Phase::AwaitStartOk, MethodKind::ConnectionStartOk) => {
                let mechanism = body.shortstr("mechanism").map_err(field_defect(&body))?;
                let product = body
                    .table("client-properties")
                    .ok()
                    .and_then(|props| match props.get("product") {
                        Some(TableValue::LongStr(p)) => Some(String::from_utf8_lossy(p).into_owned()),
                        _ => None,
                    });
                info!(
                    connection = %self.conn.id(),
                    mechanism = %String::from_utf8_lossy(mechanism),
                    client = product.as_deref().unwrap_or("unknown"),
                    "Client authenticated"
                );
                let limits = &self.server.config.limits;
                let tune = self.registry().create_connection_tune(
                    limits.channel_max,
                    limits.frame_max,
                    self.server.config.heartbeat.interval_secs,
                );
                self.reply(MethodKind::ConnectionTune, tune)?;
                self.phase = Phase::AwaitTuneOk;
            }
            (Phase::AwaitTuneOk, MethodKind::ConnectionTuneOk) => {
                let channel_max = body.short("channel-max").map_err(field_defect(&body))?;
                let frame_max = body.long("frame-max").map_err(field_defect(&body))?;
                let limits = &self.server.config.limits;
                let channel_max = negotiate(channel_max, limits.channel_max);
                let agreed = negotiate_frame_max(frame_max, limits.frame_max);
                if agreed != negotiate(frame_max, limits.frame_max) {
                    warn!(
                        connection = %self.conn.id(),
                        requested = frame_max,
                        using = agreed,
                        "Client frame-max below protocol minimum"
                    );
                }
                let frame_max = agreed;
                self.ctx.tune(channel_max, frame_max);
                self.conn.set_max_frame_size(frame_max as usize);
                self.phase = Phase::AwaitOpen;
            }
            (Phase::AwaitOpen, MethodKind::ConnectionOpen) => {
                let name = body.shortstr("virtual-host").map_err(field_defect(&body))?;
                let name = String::from_utf8_lossy(name).into_owned();
                let Some(host) = self.server.vhosts.get(&name) else {
                    return Err(ProtocolViolation::command_invalid(
                        &body,
                        0,
                        InvalidReason::UnknownVirtualHost(name),
                    )
                    .into());
                };
                self.ctx.bind_virtual_host(host);
                self.reply(MethodKind::ConnectionOpenOk, self.registry().create_connection_open_ok(""))?;
                self.phase = Phase::Open;
            }
            (_, MethodKind::ConnectionClose) => {
                let code = body.short("reply-code").map_err(field_defect(&body))?;
                let text = body.shortstr("reply-text").map_err(field_defect(&body))?;
                info!(
                    connection = %self.conn.id(),
                    reply_code = code,
                    reply_text = %String::from_utf8_lossy(text),
                    "Connection closed by peer"
                );
                self.reply(MethodKind::ConnectionCloseOk, self.registry().create_connection_close_ok())?;
                return Ok(Next::Close);
            }
            _ => {
                return Err(
                    ProtocolViolation::command_invalid(&body, 0, InvalidReason::OutOfSequence).into(),
                );
            }
        }
        Ok(Next::Continue)
    }

    fn registry(&self) -> &'static warren_protocol::MethodRegistry {
        self.ctx.method_registry()
    }

    fn reply(
        &mut self,
        kind: MethodKind,
        body: Result<MethodBody, warren_protocol::DecodeError>,
    ) -> Result<(), DispatchError> {
        let body = body.map_err(|source| Defect::BuildFailed {
            method: method_name(kind),
            source,
        })?;
        self.ctx.write_frame(body.to_frame(0));
        Ok(())
    }

    fn send_start(&mut self) -> Result<(), DispatchError> {
        let protocol = &self.server.config.protocol;
        let properties = FieldTable::new()
            .with("product", long_str(&protocol.product))
            .with("version", long_str(env!("CARGO_PKG_VERSION")))
            .with("platform", long_str("Rust"));
        let start = self.registry().create_connection_start(properties, &protocol.mechanisms, "en_US");
        self.reply(MethodKind::ConnectionStart, start)
    }

    /// Send `connection.close` for a violation and wait for `close-ok`.
    fn close_for(&mut self, violation: &ProtocolViolation) -> Result<Next> {
        warn!(
            connection = %self.conn.id(),
            reply_code = violation.reply_code(),
            channel = violation.channel(),
            fatal = violation.is_connection_fatal(),
            error = %violation,
            "Protocol violation"
        );
        metrics::record_violation(violation.reply_code());
        let close = violation
            .close_method(self.registry())
            .map_err(|source| Defect::BuildFailed {
                method: "connection.close",
                source,
            })?;
        self.ctx.write_frame(close.to_frame(0));
        self.phase = Phase::Closing;
        Ok(Next::Continue)
    }

    fn report_channels(&mut self) {
        let open = self.ctx.channel_count();
        metrics::adjust_channels(open as i64 - self.channels_reported as i64);
        self.channels_reported = open;
    }

    /// Write queued frames, one flushed write per batch.
    async fn write_pending(&mut self) -> Result<(), TransportError> {
        for batch in self.ctx.take_batches() {
            for frame in &batch {
                metrics::record_frame(frame.encoded_len(), "outbound");
            }
            self.conn.send_all(batch).await?;
        }
        Ok(())
    }
}

/// Lower of the two limits, where 0 means "no limit".
fn negotiate<T: Copy + Ord + Default>(client: T, server: T) -> T {
    if client == T::default() {
        server
    } else if server == T::default() {
        client
    } else {
        client.min(server)
    }
}

/// Negotiated frame size, never below the protocol minimum.
fn negotiate_frame_max(client: u32, server: u32) -> u32 {
    negotiate(client, server).max(FRAME_MIN_SIZE)
}

fn long_str(s: &str) -> TableValue {
    TableValue::LongStr(Bytes::copy_from_slice(s.as_bytes()))
}

fn method_name(kind: MethodKind) -> &'static str {
    match kind {
        MethodKind::ConnectionStart => "connection.start",
        MethodKind::ConnectionTune => "connection.tune",
        MethodKind::ConnectionOpenOk => "connection.open-ok",
        MethodKind::ConnectionCloseOk => "connection.close-ok",
        _ => "connection method",
    }
}

fn field_defect(body: &MethodBody) -> impl FnOnce(warren_protocol::FieldError) -> DispatchError + '_ {
    move |err| {
        Defect::FieldAccess {
            method: body.name(),
            reason: err.to_string(),
        }
        .into()
    }
}
