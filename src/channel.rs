//! The channel engine: per-channel protocol state, the content-assembly
//! sub-state-machine, publisher confirm bookkeeping, and consumer/get
//! dispatch.
//!
//! A `Channel` is driven two ways: the host calls a `begin_*` method to
//! build the request `Method` for an operation (the host is responsible for
//! framing it and handing it to the connection engine to send), and calls
//! [`Channel::handle_method`]/[`Channel::handle_content_header`]/
//! [`Channel::handle_content_body`] with whatever the connection engine
//! routed to this channel off the wire. Events accumulate in an internal
//! queue, drained with [`Channel::poll_event`].

use std::collections::{HashMap, VecDeque};

use crate::content::{self, BasicProperties, Content, ContentHeader};
use crate::error::{AmqpError, AmqpResult};
use crate::methods::{self, Method};
use crate::reply::{AmqpException, ReplyCode};
use crate::types::FieldTable;

/// Channel lifecycle state (AMQP 0-9-1 §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Initial,
    Opening,
    Open,
    Closing,
    Closed,
}

/// What a content-header/content-body pair in flight belongs to.
#[derive(Debug, Clone, PartialEq)]
enum PendingDelivery {
    Deliver {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    },
    Return {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    },
    GetOk {
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
    },
}

/// Content-assembly sub-state: a channel is either idle, waiting for the
/// content header that follows a just-received delivery/return/get-ok
/// method, or waiting for more body frames to reach the header's declared
/// `body_size`.
#[derive(Debug, Clone, PartialEq)]
enum ContentAssembly {
    Idle,
    AwaitingHeader(PendingDelivery),
    AwaitingBody {
        delivery: PendingDelivery,
        properties: BasicProperties,
        body_size: u64,
        received: Vec<u8>,
    },
}

/// Events a channel produces as frames are routed into it, or as replies to
/// host-initiated requests arrive.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Closed { exception: Option<AmqpException> },
    FlowChanged { active: bool },
    ExchangeDeclared,
    ExchangeDeleted,
    ExchangeBound,
    ExchangeUnbound,
    QueueDeclared {
        queue: String,
        message_count: u32,
        consumer_count: u32,
    },
    QueueBound,
    QueueUnbound,
    QueuePurged { message_count: u32 },
    QueueDeleted { message_count: u32 },
    QosOk,
    ConsumeOk { consumer_tag: String },
    CancelOk { consumer_tag: String },
    ConsumerCancelled { consumer_tag: String },
    Delivered {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        content: Content,
    },
    Returned {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
        content: Content,
    },
    GetOk {
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
        content: Content,
    },
    GetEmpty,
    Acked { delivery_tag: u64 },
    Nacked { delivery_tag: u64 },
    ConfirmSelectOk,
    TxSelectOk,
    TxCommitOk,
    TxRollbackOk,
}

/// Per-channel protocol engine.
pub struct Channel {
    id: u16,
    state: ChannelState,
    /// The `(class_id, method_id)` of the reply a synchronous request is
    /// waiting on, if any. A channel may have only one outstanding
    /// synchronous call at a time (§4.4).
    pending_sync: Option<(u16, u16)>,
    assembly: ContentAssembly,
    events: VecDeque<ChannelEvent>,
    /// Methods this engine must send without the host asking for them
    /// (currently just `Channel.Flow-Ok`, echoed back to whichever peer
    /// asked us to pause/resume).
    outbound: VecDeque<Method>,
    consumers: HashMap<String, ()>,
    confirm_mode: bool,
    next_publish_seq_no: u64,
    unconfirmed: VecDeque<u64>,
}

impl Channel {
    pub fn new(id: u16) -> Self {
        Channel {
            id,
            state: ChannelState::Initial,
            pending_sync: None,
            assembly: ContentAssembly::Idle,
            events: VecDeque::new(),
            outbound: VecDeque::new(),
            consumers: HashMap::new(),
            confirm_mode: false,
            next_publish_seq_no: 1,
            unconfirmed: VecDeque::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn poll_event(&mut self) -> Option<ChannelEvent> {
        self.events.pop_front()
    }

    /// Drain methods this engine queued on its own initiative (currently
    /// just `Channel.Flow-Ok`). The host must frame and send each of these
    /// after the call that produced them.
    pub fn poll_outbound(&mut self) -> Option<Method> {
        self.outbound.pop_front()
    }

    /// Force this channel closed as a side effect of its connection tearing
    /// down (e.g. a server-initiated `Connection.Close`). Evicts consumers
    /// and clears any pending synchronous call the same way a channel-level
    /// Close does; the caller is responsible for surfacing the event.
    pub fn force_close(&mut self) {
        self.state = ChannelState::Closed;
        self.pending_sync = None;
        self.consumers.clear();
    }

    fn push(&mut self, event: ChannelEvent) {
        self.events.push_back(event);
    }

    fn queue_outbound(&mut self, method: Method) {
        self.outbound.push_back(method);
    }

    fn begin_sync(&mut self, reply: (u16, u16)) -> AmqpResult<()> {
        if self.pending_sync.is_some() {
            return Err(AmqpError::invalid_state(
                "channel has a synchronous call already in flight",
            ));
        }
        self.pending_sync = Some(reply);
        Ok(())
    }

    /// Build the `Channel.Open` method and transition to `Opening`.
    pub fn begin_open(&mut self) -> AmqpResult<Method> {
        if self.state != ChannelState::Initial {
            return Err(AmqpError::invalid_state("channel is not in its initial state"));
        }
        self.state = ChannelState::Opening;
        self.begin_sync((methods::CLASS_CHANNEL, methods::ids::CHANNEL_OPEN_OK))?;
        Ok(Method::ChannelOpen)
    }

    /// Build `Channel.Close` and transition to `Closing`. Close supersedes
    /// any synchronous call already in flight rather than being blocked by
    /// it: the channel is going away regardless of what it was waiting on.
    pub fn begin_close(&mut self, reply_code: u16, reply_text: impl Into<String>) -> AmqpResult<Method> {
        if self.state != ChannelState::Open {
            return Err(AmqpError::invalid_state("channel is not open"));
        }
        self.state = ChannelState::Closing;
        self.pending_sync = Some((methods::CLASS_CHANNEL, methods::ids::CHANNEL_CLOSE_OK));
        Ok(Method::ChannelClose {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        })
    }

    /// Ask the peer to pause (`active = false`) or resume (`active = true`)
    /// delivery on this channel.
    pub fn begin_flow(&mut self, active: bool) -> AmqpResult<Method> {
        self.require_open()?;
        self.begin_sync((methods::CLASS_CHANNEL, methods::ids::CHANNEL_FLOW_OK))?;
        Ok(Method::ChannelFlow { active })
    }

    pub fn begin_exchange_declare(
        &mut self,
        exchange: impl Into<String>,
        type_: impl Into<String>,
        durable: bool,
        auto_delete: bool,
        no_wait: bool,
        arguments: FieldTable,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_EXCHANGE, methods::ids::EXCHANGE_DECLARE_OK))?;
        }
        Ok(Method::ExchangeDeclare {
            exchange: exchange.into(),
            type_: type_.into(),
            passive: false,
            durable,
            auto_delete,
            internal: false,
            no_wait,
            arguments,
        })
    }

    pub fn begin_exchange_delete(
        &mut self,
        exchange: impl Into<String>,
        if_unused: bool,
        no_wait: bool,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_EXCHANGE, methods::ids::EXCHANGE_DELETE_OK))?;
        }
        Ok(Method::ExchangeDelete {
            exchange: exchange.into(),
            if_unused,
            no_wait,
        })
    }

    pub fn begin_exchange_bind(
        &mut self,
        destination: impl Into<String>,
        source: impl Into<String>,
        routing_key: impl Into<String>,
        no_wait: bool,
        arguments: FieldTable,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_EXCHANGE, methods::ids::EXCHANGE_BIND_OK))?;
        }
        Ok(Method::ExchangeBind {
            destination: destination.into(),
            source: source.into(),
            routing_key: routing_key.into(),
            no_wait,
            arguments,
        })
    }

    pub fn begin_exchange_unbind(
        &mut self,
        destination: impl Into<String>,
        source: impl Into<String>,
        routing_key: impl Into<String>,
        no_wait: bool,
        arguments: FieldTable,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_EXCHANGE, methods::ids::EXCHANGE_UNBIND_OK))?;
        }
        Ok(Method::ExchangeUnbind {
            destination: destination.into(),
            source: source.into(),
            routing_key: routing_key.into(),
            no_wait,
            arguments,
        })
    }

    pub fn begin_queue_declare(
        &mut self,
        queue: impl Into<String>,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        no_wait: bool,
        arguments: FieldTable,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_QUEUE, methods::ids::QUEUE_DECLARE_OK))?;
        }
        Ok(Method::QueueDeclare {
            queue: queue.into(),
            passive: false,
            durable,
            exclusive,
            auto_delete,
            no_wait,
            arguments,
        })
    }

    pub fn begin_queue_bind(
        &mut self,
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        no_wait: bool,
        arguments: FieldTable,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_QUEUE, methods::ids::QUEUE_BIND_OK))?;
        }
        Ok(Method::QueueBind {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            no_wait,
            arguments,
        })
    }

    /// `queue.unbind` has no `no_wait` field: it always waits for the reply.
    pub fn begin_queue_unbind(
        &mut self,
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        arguments: FieldTable,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        self.begin_sync((methods::CLASS_QUEUE, methods::ids::QUEUE_UNBIND_OK))?;
        Ok(Method::QueueUnbind {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            arguments,
        })
    }

    pub fn begin_queue_purge(&mut self, queue: impl Into<String>, no_wait: bool) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_QUEUE, methods::ids::QUEUE_PURGE_OK))?;
        }
        Ok(Method::QueuePurge {
            queue: queue.into(),
            no_wait,
        })
    }

    pub fn begin_queue_delete(
        &mut self,
        queue: impl Into<String>,
        if_unused: bool,
        if_empty: bool,
        no_wait: bool,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_QUEUE, methods::ids::QUEUE_DELETE_OK))?;
        }
        Ok(Method::QueueDelete {
            queue: queue.into(),
            if_unused,
            if_empty,
            no_wait,
        })
    }

    pub fn begin_basic_qos(&mut self, prefetch_size: u32, prefetch_count: u16, global_: bool) -> AmqpResult<Method> {
        self.require_open()?;
        self.begin_sync((methods::CLASS_BASIC, methods::ids::BASIC_QOS_OK))?;
        Ok(Method::BasicQos {
            prefetch_size,
            prefetch_count,
            global_,
        })
    }

    pub fn begin_basic_consume(
        &mut self,
        queue: impl Into<String>,
        consumer_tag: impl Into<String>,
        no_local: bool,
        no_ack: bool,
        exclusive: bool,
        no_wait: bool,
        arguments: FieldTable,
    ) -> AmqpResult<Method> {
        self.require_open()?;
        let tag = consumer_tag.into();
        if !no_wait {
            self.begin_sync((methods::CLASS_BASIC, methods::ids::BASIC_CONSUME_OK))?;
        } else {
            self.consumers.insert(tag.clone(), ());
        }
        Ok(Method::BasicConsume {
            queue: queue.into(),
            consumer_tag: tag,
            no_local,
            no_ack,
            exclusive,
            no_wait,
            arguments,
        })
    }

    pub fn begin_basic_cancel(&mut self, consumer_tag: impl Into<String>, no_wait: bool) -> AmqpResult<Method> {
        self.require_open()?;
        let tag = consumer_tag.into();
        if !no_wait {
            self.begin_sync((methods::CLASS_BASIC, methods::ids::BASIC_CANCEL_OK))?;
        } else {
            self.consumers.remove(&tag);
        }
        Ok(Method::BasicCancel {
            consumer_tag: tag,
            no_wait,
        })
    }

    /// Build the method/header/body frames for a publish. Returns the
    /// `Basic.Publish` method plus the content header and body chunks the
    /// host must frame and send immediately afterward, in order, on this
    /// channel. If confirm mode is active, the returned sequence number is
    /// the delivery tag the eventual ack/nack will reference.
    pub fn begin_basic_publish(
        &mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        mandatory: bool,
        immediate: bool,
        properties: BasicProperties,
        body: Vec<u8>,
        frame_max: u32,
    ) -> AmqpResult<(Method, ContentHeader, Vec<Vec<u8>>, Option<u64>)> {
        self.require_open()?;
        let method = Method::BasicPublish {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            mandatory,
            immediate,
        };
        let header = ContentHeader {
            class_id: content::CLASS_BASIC,
            body_size: body.len() as u64,
            properties,
        };
        let chunks = content::chunk_body(&body, frame_max)
            .into_iter()
            .map(|c| c.to_vec())
            .collect();
        let seq_no = if self.confirm_mode {
            let seq = self.next_publish_seq_no;
            self.next_publish_seq_no += 1;
            self.unconfirmed.push_back(seq);
            Some(seq)
        } else {
            None
        };
        Ok((method, header, chunks, seq_no))
    }

    pub fn begin_basic_get(&mut self, queue: impl Into<String>, no_ack: bool) -> AmqpResult<Method> {
        self.require_open()?;
        self.begin_sync((methods::CLASS_BASIC, methods::ids::BASIC_GET_OK))?;
        Ok(Method::BasicGet {
            queue: queue.into(),
            no_ack,
        })
    }

    /// `basic.ack` from the client acknowledges a delivery; it has no
    /// synchronous reply.
    pub fn begin_basic_ack(&mut self, delivery_tag: u64, multiple: bool) -> AmqpResult<Method> {
        self.require_open()?;
        Ok(Method::BasicAck { delivery_tag, multiple })
    }

    pub fn begin_basic_reject(&mut self, delivery_tag: u64, requeue: bool) -> AmqpResult<Method> {
        self.require_open()?;
        Ok(Method::BasicReject { delivery_tag, requeue })
    }

    pub fn begin_basic_nack(&mut self, delivery_tag: u64, multiple: bool, requeue: bool) -> AmqpResult<Method> {
        self.require_open()?;
        Ok(Method::BasicNack {
            delivery_tag,
            multiple,
            requeue,
        })
    }

    /// `basic.recover-async` has no synchronous reply; the broker redelivers
    /// unacked messages without acknowledging the request itself.
    pub fn begin_basic_recover_async(&mut self, requeue: bool) -> AmqpResult<Method> {
        self.require_open()?;
        Ok(Method::BasicRecoverAsync { requeue })
    }

    pub fn begin_basic_recover(&mut self, requeue: bool) -> AmqpResult<Method> {
        self.require_open()?;
        self.begin_sync((methods::CLASS_BASIC, methods::ids::BASIC_RECOVER_OK))?;
        Ok(Method::BasicRecover { requeue })
    }

    pub fn begin_confirm_select(&mut self, no_wait: bool) -> AmqpResult<Method> {
        self.require_open()?;
        if !no_wait {
            self.begin_sync((methods::CLASS_CONFIRM, methods::ids::CONFIRM_SELECT_OK))?;
        } else {
            self.confirm_mode = true;
        }
        Ok(Method::ConfirmSelect { no_wait })
    }

    pub fn begin_tx_select(&mut self) -> AmqpResult<Method> {
        self.require_open()?;
        self.begin_sync((methods::CLASS_TX, methods::ids::TX_SELECT_OK))?;
        Ok(Method::TxSelect)
    }

    pub fn begin_tx_commit(&mut self) -> AmqpResult<Method> {
        self.require_open()?;
        self.begin_sync((methods::CLASS_TX, methods::ids::TX_COMMIT_OK))?;
        Ok(Method::TxCommit)
    }

    pub fn begin_tx_rollback(&mut self) -> AmqpResult<Method> {
        self.require_open()?;
        self.begin_sync((methods::CLASS_TX, methods::ids::TX_ROLLBACK_OK))?;
        Ok(Method::TxRollback)
    }

    /// True once all publishes sent in confirm mode have been acked or
    /// nacked by the broker. Hosts poll this to implement a publisher
    /// "drain" / wait-for-confirms operation.
    pub fn confirms_drained(&self) -> bool {
        self.unconfirmed.is_empty()
    }

    fn require_open(&self) -> AmqpResult<()> {
        if self.state != ChannelState::Open {
            return Err(AmqpError::invalid_state("channel is not open"));
        }
        Ok(())
    }

    /// Remove every unconfirmed tag `<= delivery_tag` if `multiple`, else
    /// just `delivery_tag`. Used by both `Basic.Ack` and `Basic.Nack`.
    fn settle_confirms(&mut self, delivery_tag: u64, multiple: bool) -> Vec<u64> {
        let mut settled = Vec::new();
        if multiple {
            while let Some(&front) = self.unconfirmed.front() {
                if front <= delivery_tag {
                    settled.push(self.unconfirmed.pop_front().unwrap());
                } else {
                    break;
                }
            }
        } else if let Some(pos) = self.unconfirmed.iter().position(|&t| t == delivery_tag) {
            settled.push(self.unconfirmed.remove(pos).unwrap());
        }
        settled
    }

    /// Process a method frame routed to this channel. Any non-continuation
    /// method frame that arrives while content is being assembled abandons
    /// the partial content (§4.3).
    pub fn handle_method(&mut self, method: Method) -> AmqpResult<()> {
        if !matches!(self.assembly, ContentAssembly::Idle) {
            self.assembly = ContentAssembly::Idle;
        }

        match method {
            Method::ChannelOpenOk => self.complete_sync(
                (methods::CLASS_CHANNEL, methods::ids::CHANNEL_OPEN_OK),
                Some(ChannelState::Open),
                ChannelEvent::Opened,
            ),
            Method::ChannelFlow { active } => {
                // The peer is asking us to pause/resume; AMQP 0-9-1 requires
                // an immediate Flow-Ok echoing the requested state.
                self.push(ChannelEvent::FlowChanged { active });
                self.queue_outbound(Method::ChannelFlowOk { active });
                Ok(())
            }
            Method::ChannelFlowOk { active } => self.complete_sync(
                (methods::CLASS_CHANNEL, methods::ids::CHANNEL_FLOW_OK),
                None,
                ChannelEvent::FlowChanged { active },
            ),
            Method::ChannelClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => {
                let exception = ReplyCode::from_code(reply_code)
                    .map(|rc| AmqpException::new(rc, reply_text).with_method(class_id, method_id));
                self.state = ChannelState::Closed;
                self.pending_sync = None;
                self.consumers.clear();
                self.push(ChannelEvent::Closed { exception });
                Ok(())
            }
            Method::ChannelCloseOk => {
                self.state = ChannelState::Closed;
                self.pending_sync = None;
                self.push(ChannelEvent::Closed { exception: None });
                Ok(())
            }
            Method::ExchangeDeclareOk => self.complete_sync(
                (methods::CLASS_EXCHANGE, methods::ids::EXCHANGE_DECLARE_OK),
                None,
                ChannelEvent::ExchangeDeclared,
            ),
            Method::ExchangeDeleteOk => self.complete_sync(
                (methods::CLASS_EXCHANGE, methods::ids::EXCHANGE_DELETE_OK),
                None,
                ChannelEvent::ExchangeDeleted,
            ),
            Method::ExchangeBindOk => self.complete_sync(
                (methods::CLASS_EXCHANGE, methods::ids::EXCHANGE_BIND_OK),
                None,
                ChannelEvent::ExchangeBound,
            ),
            Method::ExchangeUnbindOk => self.complete_sync(
                (methods::CLASS_EXCHANGE, methods::ids::EXCHANGE_UNBIND_OK),
                None,
                ChannelEvent::ExchangeUnbound,
            ),
            Method::QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            } => self.complete_sync(
                (methods::CLASS_QUEUE, methods::ids::QUEUE_DECLARE_OK),
                None,
                ChannelEvent::QueueDeclared {
                    queue,
                    message_count,
                    consumer_count,
                },
            ),
            Method::QueueBindOk => self.complete_sync(
                (methods::CLASS_QUEUE, methods::ids::QUEUE_BIND_OK),
                None,
                ChannelEvent::QueueBound,
            ),
            Method::QueueUnbindOk => self.complete_sync(
                (methods::CLASS_QUEUE, methods::ids::QUEUE_UNBIND_OK),
                None,
                ChannelEvent::QueueUnbound,
            ),
            Method::QueuePurgeOk { message_count } => self.complete_sync(
                (methods::CLASS_QUEUE, methods::ids::QUEUE_PURGE_OK),
                None,
                ChannelEvent::QueuePurged { message_count },
            ),
            Method::QueueDeleteOk { message_count } => self.complete_sync(
                (methods::CLASS_QUEUE, methods::ids::QUEUE_DELETE_OK),
                None,
                ChannelEvent::QueueDeleted { message_count },
            ),
            Method::BasicQosOk => self.complete_sync(
                (methods::CLASS_BASIC, methods::ids::BASIC_QOS_OK),
                None,
                ChannelEvent::QosOk,
            ),
            Method::BasicConsumeOk { consumer_tag } => {
                self.consumers.insert(consumer_tag.clone(), ());
                self.complete_sync(
                    (methods::CLASS_BASIC, methods::ids::BASIC_CONSUME_OK),
                    None,
                    ChannelEvent::ConsumeOk { consumer_tag },
                )
            }
            Method::BasicCancelOk { consumer_tag } => {
                self.consumers.remove(&consumer_tag);
                self.complete_sync(
                    (methods::CLASS_BASIC, methods::ids::BASIC_CANCEL_OK),
                    None,
                    ChannelEvent::CancelOk { consumer_tag },
                )
            }
            Method::BasicCancel { consumer_tag, .. } => {
                // Server-initiated cancel: the consumer is gone regardless
                // of any no_wait the server chose; this crate always replies.
                self.consumers.remove(&consumer_tag);
                self.push(ChannelEvent::ConsumerCancelled { consumer_tag });
                Ok(())
            }
            Method::BasicDeliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => {
                if !self.consumers.contains_key(&consumer_tag) {
                    return Err(AmqpError::amqp(AmqpException::new(
                        ReplyCode::CommandInvalid,
                        format!("delivery for unknown consumer tag {consumer_tag}"),
                    )));
                }
                self.assembly = ContentAssembly::AwaitingHeader(PendingDelivery::Deliver {
                    consumer_tag,
                    delivery_tag,
                    redelivered,
                    exchange,
                    routing_key,
                });
                Ok(())
            }
            Method::BasicReturn {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => {
                self.assembly = ContentAssembly::AwaitingHeader(PendingDelivery::Return {
                    reply_code,
                    reply_text,
                    exchange,
                    routing_key,
                });
                Ok(())
            }
            Method::BasicGetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
            } => {
                self.assembly = ContentAssembly::AwaitingHeader(PendingDelivery::GetOk {
                    delivery_tag,
                    redelivered,
                    exchange,
                    routing_key,
                    message_count,
                });
                Ok(())
            }
            Method::BasicGetEmpty => self.complete_sync(
                (methods::CLASS_BASIC, methods::ids::BASIC_GET_OK),
                None,
                ChannelEvent::GetEmpty,
            ),
            Method::BasicAck { delivery_tag, multiple } => {
                for tag in self.settle_confirms(delivery_tag, multiple) {
                    self.push(ChannelEvent::Acked { delivery_tag: tag });
                }
                Ok(())
            }
            Method::BasicNack {
                delivery_tag,
                multiple,
                ..
            } => {
                for tag in self.settle_confirms(delivery_tag, multiple) {
                    self.push(ChannelEvent::Nacked { delivery_tag: tag });
                }
                Ok(())
            }
            Method::BasicRecoverOk => Ok(()),
            Method::ConfirmSelectOk => {
                self.confirm_mode = true;
                self.complete_sync(
                    (methods::CLASS_CONFIRM, methods::ids::CONFIRM_SELECT_OK),
                    None,
                    ChannelEvent::ConfirmSelectOk,
                )
            }
            Method::TxSelectOk => self.complete_sync(
                (methods::CLASS_TX, methods::ids::TX_SELECT_OK),
                None,
                ChannelEvent::TxSelectOk,
            ),
            Method::TxCommitOk => self.complete_sync(
                (methods::CLASS_TX, methods::ids::TX_COMMIT_OK),
                None,
                ChannelEvent::TxCommitOk,
            ),
            Method::TxRollbackOk => self.complete_sync(
                (methods::CLASS_TX, methods::ids::TX_ROLLBACK_OK),
                None,
                ChannelEvent::TxRollbackOk,
            ),
            other => Err(AmqpError::amqp(AmqpException::new(
                ReplyCode::UnexpectedFrame,
                format!("unexpected method on channel: {other:?}"),
            ))),
        }
    }

    fn complete_sync(
        &mut self,
        reply: (u16, u16),
        new_state: Option<ChannelState>,
        event: ChannelEvent,
    ) -> AmqpResult<()> {
        match self.pending_sync {
            Some(pending) if pending == reply => {
                self.pending_sync = None;
            }
            _ => {
                return Err(AmqpError::amqp(AmqpException::new(
                    ReplyCode::UnexpectedFrame,
                    "reply did not match the outstanding synchronous call",
                )))
            }
        }
        if let Some(new_state) = new_state {
            self.state = new_state;
        }
        self.push(event);
        Ok(())
    }

    pub fn handle_content_header(&mut self, header: ContentHeader) -> AmqpResult<()> {
        let delivery = match std::mem::replace(&mut self.assembly, ContentAssembly::Idle) {
            ContentAssembly::AwaitingHeader(delivery) => delivery,
            _ => {
                return Err(AmqpError::amqp(AmqpException::new(
                    ReplyCode::UnexpectedFrame,
                    "content header arrived with no pending delivery",
                )))
            }
        };
        if header.body_size == 0 {
            self.emit_content(delivery, header.properties, Vec::new());
            return Ok(());
        }
        self.assembly = ContentAssembly::AwaitingBody {
            delivery,
            properties: header.properties,
            body_size: header.body_size,
            received: Vec::new(),
        };
        Ok(())
    }

    pub fn handle_content_body(&mut self, chunk: &[u8]) -> AmqpResult<()> {
        let (delivery, properties, body_size, mut received) =
            match std::mem::replace(&mut self.assembly, ContentAssembly::Idle) {
                ContentAssembly::AwaitingBody {
                    delivery,
                    properties,
                    body_size,
                    received,
                } => (delivery, properties, body_size, received),
                _ => {
                    return Err(AmqpError::amqp(AmqpException::new(
                        ReplyCode::UnexpectedFrame,
                        "content body arrived with no content header pending",
                    )))
                }
            };
        received.extend_from_slice(chunk);
        if (received.len() as u64) < body_size {
            self.assembly = ContentAssembly::AwaitingBody {
                delivery,
                properties,
                body_size,
                received,
            };
            return Ok(());
        }
        self.emit_content(delivery, properties, received);
        Ok(())
    }

    fn emit_content(&mut self, delivery: PendingDelivery, properties: BasicProperties, body: Vec<u8>) {
        let content = Content { properties, body };
        let event = match delivery {
            PendingDelivery::Deliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => ChannelEvent::Delivered {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                content,
            },
            PendingDelivery::Return {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => ChannelEvent::Returned {
                reply_code,
                reply_text,
                exchange,
                routing_key,
                content,
            },
            PendingDelivery::GetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
            } => ChannelEvent::GetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
                content,
            },
        };
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened_channel() -> Channel {
        let mut ch = Channel::new(1);
        ch.begin_open().unwrap();
        ch.handle_method(Method::ChannelOpenOk).unwrap();
        assert_eq!(ch.poll_event(), Some(ChannelEvent::Opened));
        ch
    }

    #[test]
    fn open_close_lifecycle() {
        let mut ch = opened_channel();
        assert_eq!(ch.state(), ChannelState::Open);
        ch.begin_close(200, "bye").unwrap();
        ch.handle_method(Method::ChannelCloseOk).unwrap();
        assert_eq!(ch.state(), ChannelState::Closed);
    }

    #[test]
    fn second_synchronous_call_while_pending_is_rejected() {
        let mut ch = opened_channel();
        ch.begin_queue_declare("q", false, false, false, false, FieldTable::new())
            .unwrap();
        assert!(ch
            .begin_queue_declare("q2", false, false, false, false, FieldTable::new())
            .is_err());
    }

    #[test]
    fn no_wait_declare_sets_no_pending_sync() {
        let mut ch = opened_channel();
        ch.begin_exchange_declare("x", "topic", false, false, true, FieldTable::new())
            .unwrap();
        // no pending sync was set, so a second call is immediately allowed
        ch.begin_exchange_declare("y", "topic", false, false, true, FieldTable::new())
            .unwrap();
    }

    #[test]
    fn publish_in_confirm_mode_assigns_sequential_tags() {
        let mut ch = opened_channel();
        ch.begin_confirm_select(true).unwrap();
        let (_, _, _, seq1) = ch
            .begin_basic_publish("", "q", false, false, BasicProperties::default(), b"a".to_vec(), 4096)
            .unwrap();
        let (_, _, _, seq2) = ch
            .begin_basic_publish("", "q", false, false, BasicProperties::default(), b"b".to_vec(), 4096)
            .unwrap();
        assert_eq!(seq1, Some(1));
        assert_eq!(seq2, Some(2));
        assert!(!ch.confirms_drained());
    }

    #[test]
    fn ack_with_multiple_settles_all_prior_tags() {
        let mut ch = opened_channel();
        ch.begin_confirm_select(true).unwrap();
        for i in 0..3 {
            ch.begin_basic_publish(
                "",
                "q",
                false,
                false,
                BasicProperties::default(),
                vec![i],
                4096,
            )
            .unwrap();
        }
        ch.handle_method(Method::BasicAck {
            delivery_tag: 2,
            multiple: true,
        })
        .unwrap();
        assert_eq!(ch.poll_event(), Some(ChannelEvent::Acked { delivery_tag: 1 }));
        assert_eq!(ch.poll_event(), Some(ChannelEvent::Acked { delivery_tag: 2 }));
        assert_eq!(ch.poll_event(), None);
        assert!(!ch.confirms_drained());
        ch.handle_method(Method::BasicAck {
            delivery_tag: 3,
            multiple: false,
        })
        .unwrap();
        assert!(ch.confirms_drained());
    }

    #[test]
    fn nack_emits_nacked_event() {
        let mut ch = opened_channel();
        ch.begin_confirm_select(true).unwrap();
        ch.begin_basic_publish("", "q", false, false, BasicProperties::default(), vec![0], 4096)
            .unwrap();
        ch.handle_method(Method::BasicNack {
            delivery_tag: 1,
            multiple: false,
            requeue: true,
        })
        .unwrap();
        assert_eq!(ch.poll_event(), Some(ChannelEvent::Nacked { delivery_tag: 1 }));
    }

    #[test]
    fn deliver_assembles_header_then_body() {
        let mut ch = opened_channel();
        ch.handle_method(Method::BasicDeliver {
            consumer_tag: "ctag".to_string(),
            delivery_tag: 1,
            redelivered: false,
            exchange: "".to_string(),
            routing_key: "q".to_string(),
        })
        .unwrap();
        ch.handle_content_header(ContentHeader {
            class_id: content::CLASS_BASIC,
            body_size: 5,
            properties: BasicProperties::default(),
        })
        .unwrap();
        assert_eq!(ch.poll_event(), None);
        ch.handle_content_body(b"hel").unwrap();
        assert_eq!(ch.poll_event(), None);
        ch.handle_content_body(b"lo").unwrap();
        match ch.poll_event() {
            Some(ChannelEvent::Delivered { content, .. }) => assert_eq!(content.body, b"hello"),
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_delivery_completes_on_header_alone() {
        let mut ch = opened_channel();
        ch.handle_method(Method::BasicGetOk {
            delivery_tag: 1,
            redelivered: false,
            exchange: "".to_string(),
            routing_key: "q".to_string(),
            message_count: 0,
        })
        .unwrap();
        ch.handle_content_header(ContentHeader {
            class_id: content::CLASS_BASIC,
            body_size: 0,
            properties: BasicProperties::default(),
        })
        .unwrap();
        match ch.poll_event() {
            Some(ChannelEvent::GetOk { content, .. }) => assert!(content.body.is_empty()),
            other => panic!("expected GetOk, got {other:?}"),
        }
    }

    #[test]
    fn server_cancel_emits_consumer_cancelled() {
        let mut ch = opened_channel();
        ch.begin_basic_consume("q", "ctag", false, false, false, true, FieldTable::new())
            .unwrap();
        ch.handle_method(Method::BasicCancel {
            consumer_tag: "ctag".to_string(),
            no_wait: true,
        })
        .unwrap();
        assert_eq!(
            ch.poll_event(),
            Some(ChannelEvent::ConsumerCancelled {
                consumer_tag: "ctag".to_string()
            })
        );
    }

    #[test]
    fn close_supersedes_a_pending_synchronous_call() {
        let mut ch = opened_channel();
        ch.begin_queue_declare("q", false, false, false, false, FieldTable::new())
            .unwrap();
        // Close must not be rejected just because Queue.DeclareOk is still outstanding.
        ch.begin_close(200, "bye").unwrap();
        ch.handle_method(Method::ChannelCloseOk).unwrap();
        assert_eq!(ch.state(), ChannelState::Closed);
    }

    #[test]
    fn inbound_flow_request_is_echoed_with_flow_ok() {
        let mut ch = opened_channel();
        ch.handle_method(Method::ChannelFlow { active: false }).unwrap();
        assert_eq!(ch.poll_event(), Some(ChannelEvent::FlowChanged { active: false }));
        assert_eq!(ch.poll_outbound(), Some(Method::ChannelFlowOk { active: false }));
        assert_eq!(ch.poll_outbound(), None);
    }

    #[test]
    fn outbound_flow_request_completes_on_flow_ok() {
        let mut ch = opened_channel();
        ch.begin_flow(false).unwrap();
        ch.handle_method(Method::ChannelFlowOk { active: false }).unwrap();
        assert_eq!(ch.poll_event(), Some(ChannelEvent::FlowChanged { active: false }));
    }

    #[test]
    fn deliver_with_unknown_consumer_tag_is_command_invalid() {
        let mut ch = opened_channel();
        let err = ch
            .handle_method(Method::BasicDeliver {
                consumer_tag: "ghost".to_string(),
                delivery_tag: 1,
                redelivered: false,
                exchange: "".to_string(),
                routing_key: "q".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.error_code_num(), 503);
    }

    #[test]
    fn server_close_evicts_consumers() {
        let mut ch = opened_channel();
        ch.begin_basic_consume("q", "ctag", false, false, false, true, FieldTable::new())
            .unwrap();
        ch.handle_method(Method::ChannelClose {
            reply_code: 320,
            reply_text: "connection forced".to_string(),
            class_id: 0,
            method_id: 0,
        })
        .unwrap();
        // the consumer is gone: a subsequent deliver for it would be rejected,
        // not because the channel is closed but because it's no longer known.
        assert!(ch
            .handle_method(Method::BasicDeliver {
                consumer_tag: "ctag".to_string(),
                delivery_tag: 1,
                redelivered: false,
                exchange: "".to_string(),
                routing_key: "q".to_string(),
            })
            .is_err());
    }

    #[test]
    fn non_continuation_method_abandons_partial_content() {
        let mut ch = opened_channel();
        ch.handle_method(Method::BasicDeliver {
            consumer_tag: "ctag".to_string(),
            delivery_tag: 1,
            redelivered: false,
            exchange: "".to_string(),
            routing_key: "q".to_string(),
        })
        .unwrap();
        // a fresh method arrives before the header: the in-flight delivery
        // is silently abandoned rather than corrupted.
        ch.handle_method(Method::BasicGetEmpty).unwrap_err();
    }
}
