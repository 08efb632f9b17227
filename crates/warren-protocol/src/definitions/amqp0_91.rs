//! AMQP 0-9-1 as spoken by the broker: no access, file, stream, dtx or
//! tunnel classes, recover split into an asynchronous and a synchronous form.

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
    method!(BasicRecoverSync, 60, 110, "basic.recover-sync", "requeue": Bit),
    method!(BasicRecoverSyncOk, 60, 111, "basic.recover-sync-ok"),
    // tx
    method!(TxSelect, 90, 10, "tx.select"),
    method!(TxSelectOk, 90, 11, "tx.select-ok"),
    method!(TxCommit, 90, 20, "tx.commit"),
    method!(TxCommitOk, 90, 21, "tx.commit-ok"),
    method!(TxRollback, 90, 30, "tx.rollback"),
    method!(TxRollbackOk, 90, 31, "tx.rollback-ok"),
];
