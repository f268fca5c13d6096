//! AMQP 0-9-1 client channel layer.
//!
//! This sits between a frame transport and application code. Each channel
//! gets its own frame handler, fed by a per-channel pump that only presents
//! the next frame once the previous one has been fully handled. Requests
//! rendezvous with their responses through a per-channel [`Synchroniser`],
//! and content-bearing deliveries are reassembled from their method,
//! header and body frames before they reach a consumer.

pub mod catcher;
pub mod channel;
pub mod config;
pub mod connection;
pub mod consumers;
pub mod dispatcher;
pub mod error;
pub mod exchange;
pub mod factory;
pub mod fault;
pub mod message;
pub mod queue;
pub mod sender;
pub mod synchroniser;

mod handler;
mod receiver;
mod validate;

pub use catcher::{Catcher, ReturnCallback};
pub use channel::{Channel, ExchangeOptions, QueueOptions};
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use consumers::ConsumerRegistry;
pub use dispatcher::{Dispatcher, FrameHandler, Readiness};
pub use error::{ChannelError, CloseReason, Result};
pub use exchange::Exchange;
pub use factory::ChannelFactory;
pub use fault::{Fault, FaultReporter};
pub use message::{DeliveryInfo, IncomingMessage, Message, MessageBuilder, ReturnInfo};
pub use queue::{ConsumeOptions, Consumer, Queue, QueueBinding};
pub use sender::{publish_frames, ChannelMethodSender, FrameSink};
pub use synchroniser::{PendingWait, Response, Synchroniser, WaitKey};
