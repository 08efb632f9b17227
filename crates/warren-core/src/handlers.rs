//! Channel-level method handlers and the dispatcher that routes to them.
//!
//! Handlers hold no state. One [`Dispatcher`] is built at startup and
//! shared by every connection; all per-connection state lives behind the
//! [`ConnectionContext`] passed to each call.

use bytes::Bytes;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, trace, warn};
use warren_protocol::{DecodeError, FieldError, Frame, MethodBody, MethodKind, MethodRegistry};

use crate::channel::Channel;
use crate::connection::ConnectionContext;
use crate::error::{Defect, DispatchError, DispatchResult, InvalidReason, ProtocolViolation};
use crate::policy::{ChannelIdPolicy, RecoverCompletion};

/// Length of the identifier carried by `channel.open-ok` in 0-9 and 0-9-1.
pub const CHANNEL_ID_LEN: usize = 16;

/// Handles one method kind.
pub trait MethodHandler: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// A [`ProtocolViolation`] when the peer sent something invalid, a
    /// [`Defect`] when the broker cannot complete a valid request.
    fn handle(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult;
}

fn field_defect(body: &MethodBody) -> impl FnOnce(FieldError) -> DispatchError + '_ {
    move |err| {
        Defect::FieldAccess {
            method: body.name(),
            reason: err.to_string(),
        }
        .into()
    }
}

fn build_defect(method: &'static str) -> impl FnOnce(DecodeError) -> DispatchError {
    move |source| Defect::BuildFailed { method, source }.into()
}

fn write_all(ctx: &mut dyn ConnectionContext, frames: Vec<Frame>) {
    for frame in frames {
        ctx.write_frame(frame);
    }
}

/// `channel.open`: create the channel and reply `channel.open-ok`.
#[derive(Debug, Default)]
pub struct ChannelOpenHandler;

impl ChannelOpenHandler {
    fn channel_id(policy: ChannelIdPolicy) -> Option<Bytes> {
        match policy {
            ChannelIdPolicy::None => None,
            ChannelIdPolicy::Random16 => {
                let mut id = [0u8; CHANNEL_ID_LEN];
                rand::thread_rng().fill_bytes(&mut id);
                Some(Bytes::copy_from_slice(&id))
            }
        }
    }
}

impl MethodHandler for ChannelOpenHandler {
    fn handle(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult {
        let Some(vhost) = ctx.virtual_host() else {
            return Err(
                ProtocolViolation::command_invalid(body, channel_id, InvalidReason::NoVirtualHost).into(),
            );
        };
        if channel_id == 0 {
            return Err(
                ProtocolViolation::command_invalid(body, channel_id, InvalidReason::ReservedChannel).into(),
            );
        }
        let channel_max = ctx.channel_max();
        if channel_id > channel_max {
            return Err(ProtocolViolation::command_invalid(
                body,
                channel_id,
                InvalidReason::ChannelMaxExceeded(channel_max),
            )
            .into());
        }
        if ctx.has_channel(channel_id) {
            return Err(ProtocolViolation::ChannelAlreadyOpen {
                version: body.version(),
                class_id: body.class_id(),
                method_id: body.method_id(),
                channel: channel_id,
            }
            .into());
        }

        let registry = ctx.method_registry();
        let channel = Channel::new(channel_id, registry, vhost.message_store(), ctx.frame_max());
        ctx.add_channel(channel);
        info!(channel = channel_id, vhost = %vhost.name(), "Channel opened");

        let reply = registry
            .create_channel_open_ok(Self::channel_id(ctx.policy().channel_id))
            .map_err(build_defect("channel.open-ok"))?;
        ctx.write_frame(reply.to_frame(channel_id));
        Ok(())
    }
}

/// `channel.flow`: pause or resume delivery and echo the new state.
#[derive(Debug, Default)]
pub struct ChannelFlowHandler;

impl MethodHandler for ChannelFlowHandler {
    fn handle(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult {
        let active = body.bit("active").map_err(field_defect(body))?;
        let registry = ctx.method_registry();

        let channel = ctx
            .channel_mut(channel_id)
            .ok_or_else(|| ProtocolViolation::channel_not_found(body, channel_id))?;
        let pending = channel.sync();
        channel.set_suspended(!active);

        write_all(ctx, pending);
        let reply = registry
            .create_channel_flow_ok(active)
            .map_err(build_defect("channel.flow-ok"))?;
        ctx.write_frame(reply.to_frame(channel_id));
        ctx.flush();
        Ok(())
    }
}

/// `channel.flow-ok`: the peer confirmed a broker-initiated flow change.
#[derive(Debug, Default)]
pub struct ChannelFlowOkHandler;

impl MethodHandler for ChannelFlowOkHandler {
    fn handle(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult {
        let active = body.bit("active").map_err(field_defect(body))?;
        if !ctx.has_channel(channel_id) {
            return Err(ProtocolViolation::channel_not_found(body, channel_id).into());
        }
        debug!(channel = channel_id, active, "Flow change confirmed");
        Ok(())
    }
}

/// `channel.close`: drain the channel, drop it and reply `channel.close-ok`.
#[derive(Debug, Default)]
pub struct ChannelCloseHandler;

impl MethodHandler for ChannelCloseHandler {
    fn handle(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult {
        let reply_code = body.short("reply-code").map_err(field_defect(body))?;
        let reply_text = body.shortstr("reply-text").map_err(field_defect(body))?;

        let channel = ctx
            .channel_mut(channel_id)
            .ok_or_else(|| ProtocolViolation::channel_not_found(body, channel_id))?;
        let pending = channel.sync();
        write_all(ctx, pending);

        if let Some(mut channel) = ctx.remove_channel(channel_id) {
            let released = channel.release_all();
            info!(
                channel = channel_id,
                reply_code,
                reply_text = %String::from_utf8_lossy(reply_text),
                released,
                "Channel closed by peer"
            );
        }

        let reply = ctx
            .method_registry()
            .create_channel_close_ok()
            .map_err(build_defect("channel.close-ok"))?;
        ctx.write_frame(reply.to_frame(channel_id));
        ctx.flush();
        Ok(())
    }
}

/// `channel.close-ok`: the peer confirmed a broker-initiated close.
#[derive(Debug, Default)]
pub struct ChannelCloseOkHandler;

impl MethodHandler for ChannelCloseOkHandler {
    fn handle(&self, ctx: &mut dyn ConnectionContext, _body: &MethodBody, channel_id: u16) -> DispatchResult {
        match ctx.remove_channel(channel_id) {
            Some(mut channel) => {
                channel.release_all();
                debug!(channel = channel_id, "Channel close confirmed");
            }
            None => trace!(channel = channel_id, "Close confirmed for channel already gone"),
        }
        Ok(())
    }
}

/// `basic.recover`: redeliver everything unacknowledged.
#[derive(Debug, Default)]
pub struct BasicRecoverHandler;

impl MethodHandler for BasicRecoverHandler {
    fn handle(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult {
        let policy = ctx.policy();
        let registry = ctx.method_registry();
        debug!(channel = channel_id, version = %policy.version, "Recover received");

        let channel = ctx
            .channel_mut(channel_id)
            .ok_or_else(|| ProtocolViolation::channel_not_found(body, channel_id))?;
        channel.resend().map_err(build_defect("basic.deliver"))?;

        match policy.recover {
            RecoverCompletion::SyncOk => {
                let frames = channel.sync();
                write_all(ctx, frames);
                let reply = registry
                    .create_basic_recover_ok()
                    .map_err(build_defect("basic.recover-ok"))?;
                ctx.write_frame(reply.to_frame(channel_id));
            }
            RecoverCompletion::Deferred => {
                let frames = channel.take_outbound();
                write_all(ctx, frames);
            }
        }
        ctx.flush();
        Ok(())
    }
}

/// `basic.recover-sync`: redeliver, complete the barrier, reply
/// `basic.recover-sync-ok`.
#[derive(Debug, Default)]
pub struct BasicRecoverSyncHandler;

impl MethodHandler for BasicRecoverSyncHandler {
    fn handle(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult {
        let registry = ctx.method_registry();
        let channel = ctx
            .channel_mut(channel_id)
            .ok_or_else(|| ProtocolViolation::channel_not_found(body, channel_id))?;
        channel.resend().map_err(build_defect("basic.deliver"))?;
        let frames = channel.sync();

        write_all(ctx, frames);
        let reply = registry
            .create_basic_recover_sync_ok()
            .map_err(build_defect("basic.recover-sync-ok"))?;
        ctx.write_frame(reply.to_frame(channel_id));
        ctx.flush();
        Ok(())
    }
}

/// `basic.ack`: release acknowledged deliveries.
#[derive(Debug, Default)]
pub struct BasicAckHandler;

impl MethodHandler for BasicAckHandler {
    fn handle(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult {
        let delivery_tag = body.longlong("delivery-tag").map_err(field_defect(body))?;
        let multiple = body.bit("multiple").map_err(field_defect(body))?;

        let channel = ctx
            .channel_mut(channel_id)
            .ok_or_else(|| ProtocolViolation::channel_not_found(body, channel_id))?;
        channel.acknowledge(delivery_tag, multiple).map_err(|err| {
            ProtocolViolation::command_invalid(body, channel_id, InvalidReason::UnknownDeliveryTag(err.0))
        })?;
        Ok(())
    }
}

/// Methods every dispatcher must handle when the version declares them.
const REQUIRED: &[MethodKind] = &[
    MethodKind::ChannelOpen,
    MethodKind::ChannelFlow,
    MethodKind::ChannelClose,
    MethodKind::BasicRecover,
    MethodKind::BasicRecoverSync,
];

/// Routes decoded methods to their handlers.
#[derive(Debug)]
pub struct Dispatcher {
    handlers: HashMap<MethodKind, Box<dyn MethodHandler>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Dispatcher with every built-in handler registered.
    #[must_use]
    pub fn new() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(MethodKind::ChannelOpen, ChannelOpenHandler);
        dispatcher.register(MethodKind::ChannelFlow, ChannelFlowHandler);
        dispatcher.register(MethodKind::ChannelFlowOk, ChannelFlowOkHandler);
        dispatcher.register(MethodKind::ChannelClose, ChannelCloseHandler);
        dispatcher.register(MethodKind::ChannelCloseOk, ChannelCloseOkHandler);
        dispatcher.register(MethodKind::BasicRecover, BasicRecoverHandler);
        dispatcher.register(MethodKind::BasicRecoverSync, BasicRecoverSyncHandler);
        dispatcher.register(MethodKind::BasicAck, BasicAckHandler);
        dispatcher
    }

    /// Dispatcher with no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `kind`, replacing any previous handler.
    pub fn register(&mut self, kind: MethodKind, handler: impl MethodHandler + 'static) {
        self.handlers.insert(kind, Box::new(handler));
    }

    #[must_use]
    pub fn handles(&self, kind: MethodKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Check that every required method the registry declares has a handler.
    ///
    /// # Errors
    ///
    /// Returns [`Defect::HandlerMissing`] naming the first method without one.
    pub fn check_registry(&self, registry: &MethodRegistry) -> Result<(), Defect> {
        for kind in REQUIRED {
            if let Some(spec) = registry.table().spec_for(*kind) {
                if !self.handles(*kind) {
                    return Err(Defect::HandlerMissing(spec.name));
                }
            }
        }
        Ok(())
    }

    /// Route a decoded method received on `channel_id`.
    ///
    /// # Errors
    ///
    /// Whatever the handler returns; [`InvalidReason::NotImplemented`] if
    /// no handler is registered for the method.
    pub fn dispatch(&self, ctx: &mut dyn ConnectionContext, body: &MethodBody, channel_id: u16) -> DispatchResult {
        debug!(
            channel = channel_id,
            class = body.class_id(),
            method = body.method_id(),
            version = %body.version(),
            "Handling {}",
            body.name()
        );
        let Some(handler) = self.handlers.get(&body.kind()) else {
            warn!(channel = channel_id, method = body.name(), "No handler registered");
            return Err(
                ProtocolViolation::command_invalid(body, channel_id, InvalidReason::NotImplemented).into(),
            );
        };
        handler.handle(ctx, body, channel_id)
    }

    /// Decode a method frame payload with the connection's registry and
    /// dispatch it.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation::Decode`] if the payload does not resolve, then
    /// see [`Self::dispatch`].
    pub fn handle_method_frame(
        &self,
        ctx: &mut dyn ConnectionContext,
        channel_id: u16,
        payload: Bytes,
    ) -> DispatchResult {
        let body = ctx
            .method_registry()
            .decode(payload)
            .map_err(|source| ProtocolViolation::Decode {
                channel: channel_id,
                source,
            })?;
        self.dispatch(ctx, &body, channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::vhost::VirtualHost;
    use std::collections::HashSet;
    use std::sync::Arc;
    use warren_protocol::{FrameType, ProtocolVersion, V0_8, V0_9, V0_91};

    const ALL: [ProtocolVersion; 3] = [V0_8, V0_9, V0_91];

    fn connection(version: ProtocolVersion) -> ConnectionState {
        let mut state = ConnectionState::new(version, 131_072).unwrap();
        state.bind_virtual_host(Arc::new(VirtualHost::new("/")));
        state
    }

    fn send(dispatcher: &Dispatcher, state: &mut ConnectionState, channel: u16, body: MethodBody) -> DispatchResult {
        dispatcher.handle_method_frame(state, channel, body.encode())
    }

    fn open(dispatcher: &Dispatcher, state: &mut ConnectionState, channel: u16) -> MethodBody {
        let body = state.method_registry().create_channel_open().unwrap();
        send(dispatcher, state, channel, body).unwrap();
        let frames = state.take_outbound();
        assert_eq!(frames.len(), 1);
        state.method_registry().decode(frames[0].payload.clone()).unwrap()
    }

    fn methods(state: &mut ConnectionState) -> Vec<MethodBody> {
        let registry = state.method_registry();
        state
            .take_outbound()
            .into_iter()
            .filter(|f| f.frame_type == FrameType::Method)
            .map(|f| registry.decode(f.payload).unwrap())
            .collect()
    }

    /// Deliver nine messages and acknowledge all but 5, 7 and 9.
    fn with_unacked_5_7_9(state: &mut ConnectionState, channel: u16) {
        let ch = state.channel_mut(channel).unwrap();
        for _ in 1..=9 {
            ch.deliver("ctag", "amq.direct", "key", Bytes::from_static(b"body"), false)
                .unwrap();
        }
        for tag in [1, 2, 3, 4, 6, 8] {
            ch.acknowledge(tag, false).unwrap();
        }
        ch.take_outbound();
    }

    #[test]
    fn test_open_without_virtual_host() {
        let dispatcher = Dispatcher::new();
        for version in ALL {
            let mut state = ConnectionState::new(version, 131_072).unwrap();
            let body = state.method_registry().create_channel_open().unwrap();
            let err = send(&dispatcher, &mut state, 1, body).unwrap_err();
            match err {
                DispatchError::Violation(v) => assert_eq!(v.reply_code(), 503),
                other => panic!("unexpected: {other:?}"),
            }
            assert_eq!(state.channel_count(), 0);
            assert!(state.pending_frames().is_empty());
        }
    }

    #[test]
    fn test_open_ok_payload_per_version() {
        let dispatcher = Dispatcher::new();

        let mut v8 = connection(V0_8);
        let reply = open(&dispatcher, &mut v8, 1);
        assert_eq!(reply.kind(), MethodKind::ChannelOpenOk);
        assert!(reply.fields().is_empty());
        assert!(v8.has_channel(1));

        for version in [V0_9, V0_91] {
            let mut state = connection(version);
            let mut ids = HashSet::new();
            for channel in 1..=20 {
                let reply = open(&dispatcher, &mut state, channel);
                let id = reply.longstr("channel-id").unwrap();
                assert_eq!(id.len(), CHANNEL_ID_LEN);
                ids.insert(id.clone());
            }
            assert_eq!(ids.len(), 20);
        }
    }

    #[test]
    fn test_open_rejects_reserved_and_duplicate_channels() {
        let dispatcher = Dispatcher::new();
        let mut state = connection(V0_91);
        let body = state.method_registry().create_channel_open().unwrap();
        assert!(send(&dispatcher, &mut state, 0, body.clone()).is_err());

        open(&dispatcher, &mut state, 3);
        match send(&dispatcher, &mut state, 3, body).unwrap_err() {
            DispatchError::Violation(ProtocolViolation::ChannelAlreadyOpen { channel, .. }) => {
                assert_eq!(channel, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_open_above_channel_max() {
        let dispatcher = Dispatcher::new();
        for version in ALL {
            let mut state = connection(version);
            state.tune(10, 0);
            let body = state.method_registry().create_channel_open().unwrap();

            match send(&dispatcher, &mut state, 60_000, body.clone()).unwrap_err() {
                DispatchError::Violation(v) => {
                    assert_eq!(v.reply_code(), 504);
                    assert_eq!(v.channel(), 60_000);
                }
                other => panic!("unexpected: {other:?}"),
            }
            assert!(send(&dispatcher, &mut state, 11, body).is_err());
            assert_eq!(state.channel_count(), 0);
            assert!(state.pending_frames().is_empty());

            open(&dispatcher, &mut state, 10);
            assert!(state.has_channel(10));
        }
    }

    #[test]
    fn test_recover_0_8_replies_after_redeliveries() {
        let dispatcher = Dispatcher::new();
        let mut state = connection(V0_8);
        open(&dispatcher, &mut state, 1);
        with_unacked_5_7_9(&mut state, 1);

        let body = state.method_registry().create_basic_recover(true).unwrap();
        send(&dispatcher, &mut state, 1, body).unwrap();

        let replies = methods(&mut state);
        let kinds: Vec<MethodKind> = replies.iter().map(MethodBody::kind).collect();
        assert_eq!(
            kinds,
            vec![
                MethodKind::BasicDeliver,
                MethodKind::BasicDeliver,
                MethodKind::BasicDeliver,
                MethodKind::BasicRecoverOk,
            ]
        );
        let tags: Vec<u64> = replies[..3]
            .iter()
            .map(|b| b.longlong("delivery-tag").unwrap())
            .collect();
        assert_eq!(tags, vec![5, 7, 9]);
        assert!(replies[..3].iter().all(|b| b.bit("redelivered").unwrap()));
        assert!(!state.channel_mut(1).unwrap().sync_pending());
    }

    #[test]
    fn test_recover_0_9_and_0_9_1_sends_no_reply() {
        let dispatcher = Dispatcher::new();
        for version in [V0_9, V0_91] {
            let mut state = connection(version);
            open(&dispatcher, &mut state, 1);
            with_unacked_5_7_9(&mut state, 1);

            let body = state.method_registry().create_basic_recover(false).unwrap();
            send(&dispatcher, &mut state, 1, body).unwrap();

            let replies = methods(&mut state);
            assert_eq!(replies.len(), 3);
            assert!(replies.iter().all(|b| b.kind() == MethodKind::BasicDeliver));
            assert!(state.channel_mut(1).unwrap().sync_pending());
        }
    }

    #[test]
    fn test_recover_sync_completes_barrier() {
        let dispatcher = Dispatcher::new();
        for version in [V0_9, V0_91] {
            let mut state = connection(version);
            open(&dispatcher, &mut state, 1);
            with_unacked_5_7_9(&mut state, 1);

            let body = state.method_registry().create_basic_recover_sync(true).unwrap();
            send(&dispatcher, &mut state, 1, body).unwrap();

            let replies = methods(&mut state);
            assert_eq!(replies.len(), 4);
            assert_eq!(replies[3].kind(), MethodKind::BasicRecoverSyncOk);
            assert!(!state.channel_mut(1).unwrap().sync_pending());
        }
    }

    #[test]
    fn test_flow_toggles_suspension_and_echoes() {
        let dispatcher = Dispatcher::new();
        for version in ALL {
            let mut state = connection(version);
            open(&dispatcher, &mut state, 2);
            let gate = state.channel_mut(2).unwrap().flow_gate();

            for active in [false, true, false] {
                let body = state.method_registry().create_channel_flow(active).unwrap();
                send(&dispatcher, &mut state, 2, body).unwrap();

                assert_eq!(gate.is_suspended(), !active);
                let replies = methods(&mut state);
                assert_eq!(replies.len(), 1);
                assert_eq!(replies[0].kind(), MethodKind::ChannelFlowOk);
                assert_eq!(replies[0].bit("active").unwrap(), active);
            }
        }
    }

    #[test]
    fn test_flow_drains_pending_frames_before_reply() {
        let dispatcher = Dispatcher::new();
        let mut state = connection(V0_91);
        open(&dispatcher, &mut state, 1);
        state
            .channel_mut(1)
            .unwrap()
            .deliver("ctag", "", "q", Bytes::from_static(b"x"), false)
            .unwrap();

        let body = state.method_registry().create_channel_flow(false).unwrap();
        send(&dispatcher, &mut state, 1, body).unwrap();
        let kinds: Vec<MethodKind> = methods(&mut state).iter().map(MethodBody::kind).collect();
        assert_eq!(kinds, vec![MethodKind::BasicDeliver, MethodKind::ChannelFlowOk]);
    }

    #[test]
    fn test_missing_channel_writes_nothing() {
        let dispatcher = Dispatcher::new();
        for version in ALL {
            let mut state = connection(version);
            let registry = state.method_registry();
            for body in [
                registry.create_channel_flow(true).unwrap(),
                registry.create_basic_recover(true).unwrap(),
            ] {
                let err = send(&dispatcher, &mut state, 7, body).unwrap_err();
                match err {
                    DispatchError::Violation(v @ ProtocolViolation::ChannelNotFound { .. }) => {
                        assert_eq!(v.channel(), 7);
                        assert_eq!(v.reply_code(), 504);
                    }
                    other => panic!("unexpected: {other:?}"),
                }
                assert!(state.pending_frames().is_empty());
            }
        }
    }

    #[test]
    fn test_close_removes_channel_and_replies() {
        let dispatcher = Dispatcher::new();
        let mut state = connection(V0_9);
        open(&dispatcher, &mut state, 4);
        state
            .channel_mut(4)
            .unwrap()
            .deliver("ctag", "", "q", Bytes::from_static(b"x"), false)
            .unwrap();
        state.take_outbound();

        let body = state
            .method_registry()
            .create_channel_close(200, "bye", 0, 0)
            .unwrap();
        send(&dispatcher, &mut state, 4, body).unwrap();
        assert!(!state.has_channel(4));
        let replies = methods(&mut state);
        assert_eq!(replies.last().unwrap().kind(), MethodKind::ChannelCloseOk);
    }

    #[test]
    fn test_ack_unknown_tag_is_command_invalid() {
        let dispatcher = Dispatcher::new();
        let mut state = connection(V0_91);
        open(&dispatcher, &mut state, 1);
        let body = state.method_registry().create_basic_ack(42, false).unwrap();
        match send(&dispatcher, &mut state, 1, body).unwrap_err() {
            DispatchError::Violation(v) => assert_eq!(v.reply_code(), 503),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unhandled_and_unknown_methods() {
        let dispatcher = Dispatcher::new();
        let mut state = connection(V0_91);
        // basic.qos is declared but has no handler
        let qos = Bytes::from_static(&[0, 60, 0, 10, 0, 0, 0, 0, 0, 0, 0]);
        match dispatcher.handle_method_frame(&mut state, 1, qos).unwrap_err() {
            DispatchError::Violation(v) => assert_eq!(v.reply_code(), 540),
            other => panic!("unexpected: {other:?}"),
        }
        // basic.recover-ok does not exist in 0-9-1
        let recover_ok = Bytes::from_static(&[0, 60, 0, 101]);
        match dispatcher.handle_method_frame(&mut state, 1, recover_ok).unwrap_err() {
            DispatchError::Violation(ProtocolViolation::Decode { source, .. }) => {
                assert!(matches!(source, DecodeError::UnknownMethod { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_check_registry() {
        let registry = MethodRegistry::for_version(V0_8).unwrap();
        assert!(Dispatcher::new().check_registry(registry).is_ok());

        let mut partial = Dispatcher::empty();
        partial.register(MethodKind::ChannelOpen, ChannelOpenHandler);
        assert_eq!(
            partial.check_registry(registry),
            Err(Defect::HandlerMissing("channel.flow"))
        );
    }
}
