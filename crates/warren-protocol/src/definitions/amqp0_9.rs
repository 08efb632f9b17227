//! AMQP 0-9, including the broker's recover-sync pair and exchange.bound.

use crate::method::MethodSpec;

pub static METHODS: &[MethodSpec] = &[
    // connection
    method!(ConnectionStart, 10, 10, "connection.start",
        "version-major": Octet, "version-minor": Octet, "server-properties": Table,
        "mechanisms": LongStr, "locales": LongStr),
    method!(ConnectionStartOk, 10, 11, "connection.start-ok",
        "client-properties": Table, "mechanism": ShortStr, "response": LongStr, "locale": ShortStr),
    method!(ConnectionSecure, 10, 20, "connection.secure", "challenge": LongStr),
    method!(ConnectionSecureOk, 10, 21, "connection.secure-ok", "response": LongStr),
    method!(ConnectionTune, 10, 30, "connection.tune",
        "channel-max": Short, "frame-max": Long, "heartbeat": Short),
    method!(ConnectionTuneOk, 10, 31, "connection.tune-ok",
        "channel-max": Short, "frame-max": Long, "heartbeat": Short),
    method!(ConnectionOpen, 10, 40, "connection.open",
        "virtual-host": ShortStr, "capabilities": ShortStr, "insist": Bit),
    method!(ConnectionOpenOk, 10, 41, "connection.open-ok", "known-hosts": ShortStr),
    method!(ConnectionRedirect, 10, 42, "connection.redirect",
        "host": ShortStr, "known-hosts": ShortStr),
    method!(ConnectionClose, 10, 50, "connection.close",
        "reply-code": Short, "reply-text": ShortStr, "class-id": Short, "method-id": Short),
    method!(ConnectionCloseOk, 10, 51, "connection.close-ok"),
    // channel
    method!(ChannelOpen, 20, 10, "channel.open", "out-of-band": ShortStr),
    method!(ChannelOpenOk, 20, 11, "channel.open-ok", "channel-id": LongStr),
    method!(ChannelFlow, 20, 20, "channel.flow", "active": Bit),
    method!(ChannelFlowOk, 20, 21, "channel.flow-ok", "active": Bit),
    method!(ChannelClose, 20, 40, "channel.close",
        "reply-code": Short, "reply-text": ShortStr, "class-id": Short, "method-id": Short),
    method!(ChannelCloseOk, 20, 41, "channel.close-ok"),
    method!(ChannelResume, 20, 50, "channel.resume", "channel-id": LongStr),
    method!(ChannelPing, 20, 60, "channel.ping"),
    method!(ChannelPong, 20, 70, "channel.pong"),
    method!(ChannelOk, 20, 80, "channel.ok"),
    // access
    method!(AccessRequest, 30, 10, "access.request",
        "realm": ShortStr, "exclusive": Bit, "passive": Bit, "active": Bit, "write": Bit, "read": Bit),
    method!(AccessRequestOk, 30, 11, "access.request-ok", "ticket": Short),
    // exchange
    method!(ExchangeDeclare, 40, 10, "exchange.declare",
        "ticket": Short, "exchange": ShortStr, "type": ShortStr, "passive": Bit, "durable": Bit,
        "auto-delete": Bit, "internal": Bit, "nowait": Bit, "arguments": Table),
    method!(ExchangeDeclareOk, 40, 11, "exchange.declare-ok"),
    method!(ExchangeDelete, 40, 20, "exchange.delete",
        "ticket": Short, "exchange": ShortStr, "if-unused": Bit, "nowait": Bit),
    method!(ExchangeDeleteOk, 40, 21, "exchange.delete-ok"),
    method!(ExchangeBound, 40, 22, "exchange.bound",
        "exchange": ShortStr, "routing-key": ShortStr, "queue": ShortStr),
    method!(ExchangeBoundOk, 40, 23, "exchange.bound-ok",
        "reply-code": Short, "reply-text": ShortStr),
    // queue
    method!(QueueDeclare, 50, 10, "queue.declare",
        "ticket": Short, "queue": ShortStr, "passive": Bit, "durable": Bit, "exclusive": Bit,
        "auto-delete": Bit, "nowait": Bit, "arguments": Table),
    method!(QueueDeclareOk, 50, 11, "queue.declare-ok",
        "queue": ShortStr, "message-count": Long, "consumer-count": Long),
    method!(QueueBind, 50, 20, "queue.bind",
        "ticket": Short, "queue": ShortStr, "exchange": ShortStr, "routing-key": ShortStr,
        "nowait": Bit, "arguments": Table),
    method!(QueueBindOk, 50, 21, "queue.bind-ok"),
    method!(QueuePurge, 50, 30, "queue.purge",
        "ticket": Short, "queue": ShortStr, "nowait": Bit),
    method!(QueuePurgeOk, 50, 31, "queue.purge-ok", "message-count": Long),
    method!(QueueDelete, 50, 40, "queue.delete",
        "ticket": Short, "queue": ShortStr, "if-unused": Bit, "if-empty": Bit, "nowait": Bit),
    method!(QueueDeleteOk, 50, 41, "queue.delete-ok", "message-count": Long),
    method!(QueueUnbind, 50, 50, "queue.unbind",
        "ticket": Short, "queue": ShortStr, "exchange": ShortStr, "routing-key": ShortStr,
        "arguments": Table),
    method!(QueueUnbindOk, 50, 51, "queue.unbind-ok"),
    // basic
    method!(BasicQos, 60, 10, "basic.qos",
        "prefetch-size": Long, "prefetch-count": Short, "global": Bit),
    method!(BasicQosOk, 60, 11, "basic.qos-ok"),
    method!(BasicConsume, 60, 20, "basic.consume",
        "ticket": Short, "queue": ShortStr, "consumer-tag": ShortStr, "no-local": Bit,
        "no-ack": Bit, "exclusive": Bit, "nowait": Bit, "arguments": Table),
    method!(BasicConsumeOk, 60, 21, "basic.consume-ok", "consumer-tag": ShortStr),
    method!(BasicCancel, 60, 30, "basic.cancel", "consumer-tag": ShortStr, "nowait": Bit),
    method!(BasicCancelOk, 60, 31, "basic.cancel-ok", "consumer-tag": ShortStr),
    method!(BasicPublish, 60, 40, "basic.publish",
        "ticket": Short, "exchange": ShortStr, "routing-key": ShortStr, "mandatory": Bit,
        "immediate": Bit),
    method!(BasicReturn, 60, 50, "basic.return",
        "reply-code": Short, "reply-text": ShortStr, "exchange": ShortStr, "routing-key": ShortStr),
    method!(BasicDeliver, 60, 60, "basic.deliver",
        "consumer-tag": ShortStr, "delivery-tag": LongLong, "redelivered": Bit,
        "exchange": ShortStr, "routing-key": ShortStr),
    method!(BasicGet, 60, 70, "basic.get", "ticket": Short, "queue": ShortStr, "no-ack": Bit),
    method!(BasicGetOk, 60, 71, "basic.get-ok",
        "delivery-tag": LongLong, "redelivered": Bit, "exchange": ShortStr,
        "routing-key": ShortStr, "message-count": Long),
    method!(BasicGetEmpty, 60, 72, "basic.get-empty", "cluster-id": ShortStr),
    method!(BasicAck, 60, 80, "basic.ack", "delivery-tag": LongLong, "multiple": Bit),
    method!(BasicReject, 60, 90, "basic.reject", "delivery-tag": LongLong, "requeue": Bit),
    method!(BasicRecover, 60, 100, "basic.recover", "requeue": Bit),
    method!(BasicRecoverSyncOk, 60, 101, "basic.recover-sync-ok"),
    method!(BasicRecoverSync, 60, 102, "basic.recover-sync", "requeue": Bit),
    // file
    method!(FileQos, 70, 10, "file.qos",
        "prefetch-size": Long, "prefetch-count": Short, "global": Bit),
    method!(FileQosOk, 70, 11, "file.qos-ok"),
    method!(FileConsume, 70, 20, "file.consume",
        "ticket": Short, "queue": ShortStr, "consumer-tag": ShortStr, "no-local": Bit,
        "no-ack": Bit, "exclusive": Bit, "nowait": Bit, "filter": Table),
    method!(FileConsumeOk, 70, 21, "file.consume-ok", "consumer-tag": ShortStr),
    method!(FileCancel, 70, 30, "file.cancel", "consumer-tag": ShortStr, "nowait": Bit),
    method!(FileCancelOk, 70, 31, "file.cancel-ok", "consumer-tag": ShortStr),
    method!(FileOpen, 70, 40, "file.open", "identifier": ShortStr, "content-size": LongLong),
    method!(FileOpenOk, 70, 41, "file.open-ok", "staged-size": LongLong),
    method!(FileStage, 70, 50, "file.stage"),
    method!(FilePublish, 70, 60, "file.publish",
        "ticket": Short, "exchange": ShortStr, "routing-key": ShortStr, "mandatory": Bit,
        "immediate": Bit, "identifier": ShortStr),
    method!(FileReturn, 70, 70, "file.return",
        "reply-code": Short, "reply-text": ShortStr, "exchange": ShortStr, "routing-key": ShortStr),
    method!(FileDeliver, 70, 80, "file.deliver",
        "consumer-tag": ShortStr, "delivery-tag": LongLong, "redelivered": Bit,
        "exchange": ShortStr, "routing-key": ShortStr, "identifier": ShortStr),
    method!(FileAck, 70, 90, "file.ack", "delivery-tag": LongLong, "multiple": Bit),
    method!(FileReject, 70, 100, "file.reject", "delivery-tag": LongLong, "requeue": Bit),
    // stream
    method!(StreamQos, 80, 10, "stream.qos",
        "prefetch-size": Long, "prefetch-count": Short, "consume-rate": Long, "global": Bit),
    method!(StreamQosOk, 80, 11, "stream.qos-ok"),
    method!(StreamConsume, 80, 20, "stream.consume",
        "ticket": Short, "queue": ShortStr, "consumer-tag": ShortStr, "no-local": Bit,
        "exclusive": Bit, "nowait": Bit, "filter": Table),
    method!(StreamConsumeOk, 80, 21, "stream.consume-ok", "consumer-tag": ShortStr),
    method!(StreamCancel, 80, 30, "stream.cancel", "consumer-tag": ShortStr, "nowait": Bit),
    method!(StreamCancelOk, 80, 31, "stream.cancel-ok", "consumer-tag": ShortStr),
    method!(StreamPublish, 80, 40, "stream.publish",
        "ticket": Short, "exchange": ShortStr, "routing-key": ShortStr, "mandatory": Bit,
        "immediate": Bit),
    method!(StreamReturn, 80, 50, "stream.return",
        "reply-code": Short, "reply-text": ShortStr, "exchange": ShortStr, "routing-key": ShortStr),
    method!(StreamDeliver, 80, 60, "stream.deliver",
        "consumer-tag": ShortStr, "delivery-tag": LongLong, "exchange": ShortStr, "queue": ShortStr),
    // tx
    method!(TxSelect, 90, 10, "tx.select"),
    method!(TxSelectOk, 90, 11, "tx.select-ok"),
    method!(TxCommit, 90, 20, "tx.commit"),
    method!(TxCommitOk, 90, 21, "tx.commit-ok"),
    method!(TxRollback, 90, 30, "tx.rollback"),
    method!(TxRollbackOk, 90, 31, "tx.rollback-ok"),
    // dtx
    method!(DtxSelect, 100, 10, "dtx.select"),
    method!(DtxSelectOk, 100, 11, "dtx.select-ok"),
    method!(DtxStart, 100, 20, "dtx.start", "dtx-identifier": ShortStr),
    method!(DtxStartOk, 100, 21, "dtx.start-ok"),
    // tunnel
    method!(TunnelRequest, 110, 10, "tunnel.request", "meta-data": Table),
    // message
    method!(MessageTransfer, 120, 10, "message.transfer",
        "ticket": Short, "destination": ShortStr, "redelivered": Bit, "immediate": Bit,
        "ttl": LongLong, "priority": Octet, "timestamp": Timestamp, "delivery-mode": Octet,
        "expiration": Timestamp, "exchange": ShortStr, "routing-key": ShortStr,
        "message-id": ShortStr, "correlation-id": ShortStr, "reply-to": ShortStr,
        "content-type": ShortStr, "content-encoding": ShortStr, "user-id": ShortStr,
        "app-id": ShortStr, "transaction-id": ShortStr, "security-token": LongStr,
        "application-headers": Table, "body": LongStr),
    method!(MessageConsume, 120, 20, "message.consume",
        "ticket": Short, "queue": ShortStr, "destination": ShortStr, "no-local": Bit,
        "no-ack": Bit, "exclusive": Bit, "filter": Table),
    method!(MessageCancel, 120, 30, "message.cancel", "destination": ShortStr),
    method!(MessageGet, 120, 40, "message.get",
        "ticket": Short, "queue": ShortStr, "destination": ShortStr, "no-ack": Bit),
    method!(MessageRecover, 120, 50, "message.recover", "requeue": Bit),
    method!(MessageOpen, 120, 60, "message.open", "reference": LongStr),
    method!(MessageClose, 120, 70, "message.close", "reference": LongStr),
    method!(MessageAppend, 120, 80, "message.append", "reference": LongStr, "bytes": LongStr),
    method!(MessageCheckpoint, 120, 90, "message.checkpoint",
        "reference": LongStr, "identifier": ShortStr),
    method!(MessageResume, 120, 100, "message.resume",
        "reference": LongStr, "identifier": ShortStr),
    method!(MessageQos, 120, 110, "message.qos",
        "prefetch-size": Long, "prefetch-count": Short, "global": Bit),
    method!(MessageOk, 120, 500, "message.ok"),
    method!(MessageEmpty, 120, 510, "message.empty"),
    method!(MessageReject, 120, 520, "message.reject", "code": Short, "text": ShortStr),
    method!(MessageOffset, 120, 530, "message.offset", "value": LongLong),
];
