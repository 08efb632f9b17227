//! Per-channel protocol state.
//!
//! A [`Channel`] is owned by its connection's task. It tracks the flow
//! state, the deliveries awaiting acknowledgement, and an outbound buffer of
//! frames not yet handed to the connection. [`Channel::sync`] is the barrier
//! that drains that buffer in order.

use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use warren_protocol::frame::FRAME_OVERHEAD;
use warren_protocol::{ContentHeader, DecodeError, Frame, MethodRegistry};

use crate::vhost::{MessageId, MessageStore};

/// `basic` class id, used for content headers.
const BASIC_CLASS_ID: u16 = 60;

/// Read-only view of a channel's flow state.
///
/// Cloned into delivery collaborators that must not hold the channel itself.
#[derive(Debug, Clone)]
pub struct FlowGate(Arc<AtomicBool>);

impl FlowGate {
    /// Whether the peer has paused delivery with `channel.flow(active=false)`.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A delivery that has been sent but not acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnackedDelivery {
    pub delivery_tag: u64,
    pub consumer_tag: String,
    pub exchange: String,
    pub routing_key: String,
    pub message_id: MessageId,
    pub redelivered: bool,
}

/// What happened to a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Frames queued under this delivery tag.
    Delivered(u64),
    /// The channel is suspended; nothing was queued.
    Withheld,
}

/// Error from [`Channel::acknowledge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Delivery tag {0} is not outstanding")]
pub struct UnknownDeliveryTag(pub u64);

/// An open AMQP channel.
#[derive(Debug)]
pub struct Channel {
    id: u16,
    registry: &'static MethodRegistry,
    message_store: Arc<dyn MessageStore>,
    frame_max: u32,
    suspended: Arc<AtomicBool>,
    unacknowledged: BTreeMap<u64, UnackedDelivery>,
    next_delivery_tag: u64,
    sync_pending: bool,
    outbound: VecDeque<Frame>,
}

impl Channel {
    /// Create a channel bound to a virtual host's message store.
    #[must_use]
    pub fn new(
        id: u16,
        registry: &'static MethodRegistry,
        message_store: Arc<dyn MessageStore>,
        frame_max: u32,
    ) -> Self {
        Self {
            id,
            registry,
            message_store,
            frame_max,
            suspended: Arc::new(AtomicBool::new(false)),
            unacknowledged: BTreeMap::new(),
            next_delivery_tag: 1,
            sync_pending: false,
            outbound: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[must_use]
    pub fn message_store(&self) -> &Arc<dyn MessageStore> {
        &self.message_store
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    pub fn set_suspended(&mut self, suspended: bool) {
        let was = self.suspended.swap(suspended, Ordering::AcqRel);
        if was != suspended {
            debug!(channel = self.id, suspended, "Channel flow changed");
        }
    }

    #[must_use]
    pub fn flow_gate(&self) -> FlowGate {
        FlowGate(Arc::clone(&self.suspended))
    }

    /// Whether a resend is waiting for its sync barrier.
    #[must_use]
    pub fn sync_pending(&self) -> bool {
        self.sync_pending
    }

    /// Unacknowledged deliveries in tag order.
    pub fn unacknowledged(&self) -> impl Iterator<Item = &UnackedDelivery> {
        self.unacknowledged.values()
    }

    #[must_use]
    pub fn unacknowledged_count(&self) -> usize {
        self.unacknowledged.len()
    }

    /// Number of frames queued and not yet drained.
    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Queue a `basic.deliver` with its content.
    ///
    /// Unless `no_ack`, the content is held in the message store until the
    /// delivery is acknowledged.
    ///
    /// # Errors
    ///
    /// Fails if a tag or routing string is longer than a short string allows.
    pub fn deliver(
        &mut self,
        consumer_tag: &str,
        exchange: &str,
        routing_key: &str,
        content: Bytes,
        no_ack: bool,
    ) -> Result<DeliveryOutcome, DecodeError> {
        if self.is_suspended() {
            trace!(channel = self.id, consumer_tag, "Delivery withheld, channel suspended");
            return Ok(DeliveryOutcome::Withheld);
        }

        let delivery_tag = self.next_delivery_tag;
        self.queue_delivery(consumer_tag, delivery_tag, false, exchange, routing_key, &content)?;
        self.next_delivery_tag += 1;

        if !no_ack {
            let message_id = self.message_store.store(content);
            self.unacknowledged.insert(
                delivery_tag,
                UnackedDelivery {
                    delivery_tag,
                    consumer_tag: consumer_tag.to_string(),
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    message_id,
                    redelivered: false,
                },
            );
        }
        Ok(DeliveryOutcome::Delivered(delivery_tag))
    }

    /// Acknowledge `delivery_tag`, or every outstanding tag up to it when
    /// `multiple`. Tag 0 with `multiple` acknowledges everything.
    ///
    /// Returns the number of deliveries acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownDeliveryTag`] if a single tag is not outstanding.
    pub fn acknowledge(&mut self, delivery_tag: u64, multiple: bool) -> Result<usize, UnknownDeliveryTag> {
        let acked: Vec<UnackedDelivery> = if multiple {
            let upper = if delivery_tag == 0 { u64::MAX } else { delivery_tag };
            let tags: Vec<u64> = self.unacknowledged.range(..=upper).map(|(t, _)| *t).collect();
            tags.iter()
                .filter_map(|t| self.unacknowledged.remove(t))
                .collect()
        } else {
            let entry = self
                .unacknowledged
                .remove(&delivery_tag)
                .ok_or(UnknownDeliveryTag(delivery_tag))?;
            vec![entry]
        };

        for delivery in &acked {
            self.message_store.release(delivery.message_id);
        }
        trace!(channel = self.id, delivery_tag, multiple, count = acked.len(), "Acknowledged");
        Ok(acked.len())
    }

    /// Re-queue every unacknowledged delivery, in tag order, marked
    /// redelivered. The deliveries stay outstanding under their original tags.
    ///
    /// Returns the number of deliveries resent.
    ///
    /// # Errors
    ///
    /// Fails only if a stored routing string no longer fits a short string.
    pub fn resend(&mut self) -> Result<usize, DecodeError> {
        let tags: Vec<u64> = self.unacknowledged.keys().copied().collect();
        let mut resent = 0;
        for tag in tags {
            let Some(delivery) = self.unacknowledged.get(&tag).cloned() else {
                continue;
            };
            let Some(content) = self.message_store.retrieve(delivery.message_id) else {
                warn!(
                    channel = self.id,
                    delivery_tag = tag,
                    message_id = delivery.message_id,
                    "Message content missing from store, dropping delivery"
                );
                self.unacknowledged.remove(&tag);
                continue;
            };
            self.queue_delivery(
                &delivery.consumer_tag,
                tag,
                true,
                &delivery.exchange,
                &delivery.routing_key,
                &content,
            )?;
            if let Some(entry) = self.unacknowledged.get_mut(&tag) {
                entry.redelivered = true;
            }
            resent += 1;
        }
        self.sync_pending = true;
        debug!(channel = self.id, resent, "Resent unacknowledged deliveries");
        Ok(resent)
    }

    /// Barrier: drain every queued frame in order and clear the pending
    /// sync left by [`Self::resend`].
    pub fn sync(&mut self) -> Vec<Frame> {
        self.sync_pending = false;
        self.outbound.drain(..).collect()
    }

    /// Drain queued frames without completing a pending sync.
    pub fn take_outbound(&mut self) -> Vec<Frame> {
        self.outbound.drain(..).collect()
    }

    /// Release every held message. Called when the channel closes.
    pub fn release_all(&mut self) -> usize {
        let count = self.unacknowledged.len();
        for (_, delivery) in std::mem::take(&mut self.unacknowledged) {
            self.message_store.release(delivery.message_id);
        }
        self.outbound.clear();
        count
    }

    fn queue_delivery(
        &mut self,
        consumer_tag: &str,
        delivery_tag: u64,
        redelivered: bool,
        exchange: &str,
        routing_key: &str,
        content: &Bytes,
    ) -> Result<(), DecodeError> {
        let deliver = self.registry.create_basic_deliver(
            consumer_tag,
            delivery_tag,
            redelivered,
            exchange,
            routing_key,
        )?;
        self.outbound.push_back(deliver.to_frame(self.id));

        let header = ContentHeader::new(BASIC_CLASS_ID, content.len() as u64);
        self.outbound.push_back(Frame::content_header(self.id, &header));

        let chunk = (self.frame_max as usize).saturating_sub(FRAME_OVERHEAD).max(1);
        let mut offset = 0;
        while offset < content.len() {
            let end = (offset + chunk).min(content.len());
            self.outbound
                .push_back(Frame::content_body(self.id, content.slice(offset..end)));
            offset = end;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vhost::MemoryMessageStore;
    use warren_protocol::{FrameType, MethodKind, V0_8, V0_91};

    fn channel_with(frame_max: u32) -> Channel {
        Channel::new(
            1,
            MethodRegistry::for_version(V0_91).unwrap(),
            Arc::new(MemoryMessageStore::new()),
            frame_max,
        )
    }

    fn deliver_tags(frames: &[Frame], version: warren_protocol::ProtocolVersion) -> Vec<(u64, bool)> {
        let registry = MethodRegistry::for_version(version).unwrap();
        frames
            .iter()
            .filter(|f| f.frame_type == FrameType::Method)
            .map(|f| registry.decode(f.payload.clone()).unwrap())
            .filter(|b| b.kind() == MethodKind::BasicDeliver)
            .map(|b| (b.longlong("delivery-tag").unwrap(), b.bit("redelivered").unwrap()))
            .collect()
    }

    #[test]
    fn test_deliver_queues_method_header_and_body() {
        let mut channel = channel_with(131_072);
        let outcome = channel
            .deliver("ctag", "amq.direct", "key", Bytes::from_static(b"hello"), false)
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered(1));

        let frames = channel.take_outbound();
        let types: Vec<FrameType> = frames.iter().map(|f| f.frame_type).collect();
        assert_eq!(
            types,
            vec![FrameType::Method, FrameType::ContentHeader, FrameType::ContentBody]
        );
        assert_eq!(&frames[2].payload[..], b"hello");
        assert_eq!(channel.unacknowledged_count(), 1);
        assert_eq!(channel.message_store().message_count(), 1);
    }

    #[test]
    fn test_body_split_at_frame_max() {
        let mut channel = channel_with(4096);
        channel
            .deliver("ctag", "", "q", Bytes::from(vec![7u8; 10_000]), true)
            .unwrap();
        let frames = channel.take_outbound();
        let bodies: Vec<usize> = frames
            .iter()
            .filter(|f| f.frame_type == FrameType::ContentBody)
            .map(|f| f.payload.len())
            .collect();
        assert_eq!(bodies, vec![4088, 4088, 1824]);
        assert_eq!(channel.unacknowledged_count(), 0);
    }

    #[test]
    fn test_suspended_channel_withholds_delivery() {
        let mut channel = channel_with(131_072);
        let gate = channel.flow_gate();
        channel.set_suspended(true);
        assert!(gate.is_suspended());

        let outcome = channel
            .deliver("ctag", "", "q", Bytes::from_static(b"x"), false)
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Withheld);
        assert_eq!(channel.outbound_len(), 0);

        channel.set_suspended(false);
        assert!(!gate.is_suspended());
        assert_eq!(
            channel.deliver("ctag", "", "q", Bytes::from_static(b"x"), false).unwrap(),
            DeliveryOutcome::Delivered(1)
        );
    }

    #[test]
    fn test_resend_in_tag_order_marks_redelivered() {
        let mut channel = channel_with(131_072);
        for _ in 0..3 {
            channel.deliver("ctag", "", "q", Bytes::from_static(b"m"), false).unwrap();
        }
        channel.acknowledge(2, false).unwrap();
        channel.take_outbound();

        assert_eq!(channel.resend().unwrap(), 2);
        assert!(channel.sync_pending());
        let frames = channel.sync();
        assert!(!channel.sync_pending());
        assert_eq!(deliver_tags(&frames, V0_91), vec![(1, true), (3, true)]);
        assert!(channel.unacknowledged().all(|d| d.redelivered));
        assert_eq!(channel.unacknowledged_count(), 2);
    }

    #[test]
    fn test_take_outbound_keeps_sync_pending() {
        let mut channel = channel_with(131_072);
        channel.deliver("ctag", "", "q", Bytes::from_static(b"m"), false).unwrap();
        channel.resend().unwrap();
        assert!(!channel.take_outbound().is_empty());
        assert!(channel.sync_pending());
    }

    #[test]
    fn test_acknowledge_multiple() {
        let mut channel = channel_with(131_072);
        for _ in 0..4 {
            channel.deliver("ctag", "", "q", Bytes::from_static(b"m"), false).unwrap();
        }
        assert_eq!(channel.acknowledge(3, true), Ok(3));
        assert_eq!(channel.acknowledge(3, false), Err(UnknownDeliveryTag(3)));
        assert_eq!(channel.acknowledge(0, true), Ok(1));
        assert_eq!(channel.message_store().message_count(), 0);
    }

    #[test]
    fn test_resend_uses_channel_registry_numbering() {
        let mut channel = Channel::new(
            2,
            MethodRegistry::for_version(V0_8).unwrap(),
            Arc::new(MemoryMessageStore::new()),
            131_072,
        );
        channel.deliver("ctag", "", "q", Bytes::from_static(b"m"), false).unwrap();
        channel.take_outbound();
        channel.resend().unwrap();
        let frames = channel.sync();
        assert!(frames.iter().all(|f| f.channel == 2));
        assert_eq!(deliver_tags(&frames, V0_8), vec![(1, true)]);
    }
}
