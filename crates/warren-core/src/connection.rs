//! The connection as seen by method handlers.
//!
//! Handlers never touch sockets. They read connection state and queue
//! frames through [`ConnectionContext`]; whoever owns the socket drains
//! the queued frames and writes them in order.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use warren_protocol::{Frame, MethodRegistry, ProtocolVersion};

use crate::channel::Channel;
use crate::error::Defect;
use crate::policy::VersionPolicy;
use crate::vhost::VirtualHost;

/// Connection-facing operations available to method handlers.
pub trait ConnectionContext {
    /// Version negotiated by the protocol header.
    fn protocol_version(&self) -> ProtocolVersion;

    /// Registry matching [`Self::protocol_version`].
    fn method_registry(&self) -> &'static MethodRegistry;

    fn policy(&self) -> VersionPolicy;

    /// Host bound by `connection.open`, `None` before it.
    fn virtual_host(&self) -> Option<Arc<VirtualHost>>;

    fn channel_mut(&mut self, id: u16) -> Option<&mut Channel>;

    fn has_channel(&self, id: u16) -> bool;

    fn add_channel(&mut self, channel: Channel);

    fn remove_channel(&mut self, id: u16) -> Option<Channel>;

    /// Queue a frame for the peer.
    fn write_frame(&mut self, frame: Frame);

    /// Close the current write batch: frames queued so far are written and
    /// flushed to the peer before any frame queued after this call.
    fn flush(&mut self);

    /// Negotiated maximum frame size.
    fn frame_max(&self) -> u32;

    /// Highest channel id the peer may open.
    fn channel_max(&self) -> u16;
}

/// Per-connection state owned by the connection's task.
#[derive(Debug)]
pub struct ConnectionState {
    version: ProtocolVersion,
    registry: &'static MethodRegistry,
    policy: VersionPolicy,
    virtual_host: Option<Arc<VirtualHost>>,
    channels: HashMap<u16, Channel>,
    outbound: Vec<Frame>,
    /// Offsets into `outbound` where a flush was requested.
    flush_points: Vec<usize>,
    frame_max: u32,
    channel_max: u16,
}

impl ConnectionState {
    /// # Errors
    ///
    /// Returns [`Defect::UnsupportedVersion`] if no method table exists.
    pub fn new(version: ProtocolVersion, frame_max: u32) -> Result<Self, Defect> {
        let registry =
            MethodRegistry::for_version(version).ok_or(Defect::UnsupportedVersion(version))?;
        let policy = VersionPolicy::for_version(version)?;
        Ok(Self {
            version,
            registry,
            policy,
            virtual_host: None,
            channels: HashMap::new(),
            outbound: Vec::new(),
            flush_points: Vec::new(),
            frame_max,
            channel_max: u16::MAX,
        })
    }

    /// Bind the virtual host named in `connection.open`.
    pub fn bind_virtual_host(&mut self, host: Arc<VirtualHost>) {
        info!(vhost = %host.name(), version = %self.version, "Connection bound to virtual host");
        self.virtual_host = Some(host);
    }

    /// Apply values agreed in `connection.tune-ok`.
    pub fn tune(&mut self, channel_max: u16, frame_max: u32) {
        if channel_max != 0 {
            self.channel_max = channel_max;
        }
        if frame_max != 0 {
            self.frame_max = frame_max;
        }
        debug!(channel_max = self.channel_max, frame_max = self.frame_max, "Connection tuned");
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn channel(&self, id: u16) -> Option<&Channel> {
        self.channels.get(&id)
    }

    /// Frames queued since the last drain.
    #[must_use]
    pub fn pending_frames(&self) -> &[Frame] {
        &self.outbound
    }

    /// Take every queued frame, in write order, ignoring flush points.
    pub fn take_outbound(&mut self) -> Vec<Frame> {
        self.flush_points.clear();
        std::mem::take(&mut self.outbound)
    }

    /// Take queued frames split at flush points. Each batch is to be
    /// written and flushed before the next; frames queued after the last
    /// flush form a final batch.
    pub fn take_batches(&mut self) -> Vec<Vec<Frame>> {
        let mut frames = std::mem::take(&mut self.outbound).into_iter();
        let mut batches = Vec::with_capacity(self.flush_points.len() + 1);
        let mut start = 0;
        for point in self.flush_points.drain(..) {
            batches.push(frames.by_ref().take(point - start).collect());
            start = point;
        }
        let rest: Vec<Frame> = frames.collect();
        if !rest.is_empty() {
            batches.push(rest);
        }
        batches
    }

    /// Drop every channel, releasing held messages. Returns the number closed.
    pub fn close_all_channels(&mut self) -> usize {
        let count = self.channels.len();
        for (_, mut channel) in self.channels.drain() {
            channel.release_all();
        }
        count
    }
}

impl ConnectionContext for ConnectionState {
    fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    fn method_registry(&self) -> &'static MethodRegistry {
        self.registry
    }

    fn policy(&self) -> VersionPolicy {
        self.policy
    }

    fn virtual_host(&self) -> Option<Arc<VirtualHost>> {
        self.virtual_host.clone()
    }

    fn channel_mut(&mut self, id: u16) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    fn has_channel(&self, id: u16) -> bool {
        self.channels.contains_key(&id)
    }

    fn add_channel(&mut self, channel: Channel) {
        self.channels.insert(channel.id(), channel);
    }

    fn remove_channel(&mut self, id: u16) -> Option<Channel> {
        self.channels.remove(&id)
    }

    fn write_frame(&mut self, frame: Frame) {
        self.outbound.push(frame);
    }

    fn flush(&mut self) {
        let point = self.outbound.len();
        let last = self.flush_points.last().copied().unwrap_or(0);
        if point > last {
            self.flush_points.push(point);
        }
    }

    fn frame_max(&self) -> u32 {
        self.frame_max
    }

    fn channel_max(&self) -> u16 {
        self.channel_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use warren_protocol::{V0_8, V0_9, V0_91};

    #[test]
    fn test_new_selects_registry_and_policy() {
        let state = ConnectionState::new(V0_9, 131_072).unwrap();
        assert_eq!(state.protocol_version(), V0_9);
        assert_eq!(state.method_registry().version(), V0_9);
        assert_eq!(state.policy().version, V0_9);
        assert!(state.virtual_host().is_none());
    }

    #[test]
    fn test_unsupported_version() {
        let version = ProtocolVersion::new(0, 10);
        assert_eq!(
            ConnectionState::new(version, 131_072).unwrap_err(),
            Defect::UnsupportedVersion(version)
        );
    }

    fn body(payload: &'static [u8]) -> Frame {
        Frame::content_body(1, Bytes::from_static(payload))
    }

    fn payloads(batches: &[Vec<Frame>]) -> Vec<Vec<&[u8]>> {
        batches
            .iter()
            .map(|batch| batch.iter().map(|f| &f.payload[..]).collect())
            .collect()
    }

    #[test]
    fn test_outbound_preserves_order() {
        let mut state = ConnectionState::new(V0_8, 131_072).unwrap();
        state.write_frame(body(b"a"));
        state.write_frame(body(b"b"));
        state.flush();
        let frames = state.take_outbound();
        assert_eq!(&frames[0].payload[..], b"a");
        assert_eq!(&frames[1].payload[..], b"b");
        assert!(state.pending_frames().is_empty());
        assert!(state.take_batches().is_empty());
    }

    #[test]
    fn test_flush_splits_write_batches() {
        let mut state = ConnectionState::new(V0_91, 131_072).unwrap();
        state.write_frame(body(b"a"));
        state.write_frame(body(b"b"));
        state.flush();
        // empty batches are not produced
        state.flush();
        state.write_frame(body(b"c"));
        state.flush();
        state.write_frame(body(b"d"));

        let batches = state.take_batches();
        assert_eq!(
            payloads(&batches),
            vec![vec![&b"a"[..], &b"b"[..]], vec![&b"c"[..]], vec![&b"d"[..]]]
        );
        assert!(state.pending_frames().is_empty());

        state.flush();
        assert!(state.take_batches().is_empty());
        state.write_frame(body(b"e"));
        assert_eq!(payloads(&state.take_batches()), vec![vec![&b"e"[..]]]);
    }

    #[test]
    fn test_tune_ignores_zero() {
        let mut state = ConnectionState::new(V0_8, 131_072).unwrap();
        state.tune(0, 0);
        assert_eq!(state.frame_max(), 131_072);
        state.tune(256, 8192);
        assert_eq!(state.channel_max(), 256);
        assert_eq!(state.frame_max(), 8192);
    }
}
