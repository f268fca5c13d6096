//! Connection-level glue between a frame transport and the channel layer.
//!
//! The connection handshake (start/tune/open) is assumed to have happened
//! already; a [`Connection`] only routes channel frames.

use std::sync::Arc;

use amqprims_frame::channel::is_connection;
use amqprims_frame::{AmqpCodec, Frame, FrameBody, FrameConfig, FrameError, CONNECTION};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::channel::Channel;
use crate::config::ConnectionConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ChannelError, Result};
use crate::factory::ChannelFactory;
use crate::fault::{Fault, FaultReporter};
use crate::sender::FrameSink;

/// An established AMQP connection carrying any number of channels.
pub struct Connection {
    config: ConnectionConfig,
    dispatcher: Arc<Dispatcher>,
    factory: Arc<ChannelFactory>,
    reporter: FaultReporter,
    faults: Option<mpsc::UnboundedReceiver<Fault>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Build the channel layer over `sink`. Inbound frames are fed with
    /// [`Connection::dispatch`].
    pub fn new(sink: Arc<dyn FrameSink>, config: ConnectionConfig) -> Self {
        let (reporter, faults) = FaultReporter::channel();
        let dispatcher = Arc::new(Dispatcher::new(reporter.clone()));
        let factory = Arc::new(ChannelFactory::new(
            config,
            sink,
            Arc::clone(&dispatcher),
            reporter.clone(),
        ));
        Self {
            config,
            dispatcher,
            factory,
            reporter,
            faults: Some(faults),
            tasks: Vec::new(),
        }
    }

    /// Run the channel layer over an already-negotiated stream.
    ///
    /// A reader task decodes and dispatches inbound frames; a writer task
    /// encodes everything the channels send. When the stream ends every
    /// open channel fails with [`ChannelError::ConnectionClosed`].
    pub fn spawn<T>(io: T, config: ConnectionConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Frame>>();
        let mut connection = Self::new(Arc::new(tx), config);
        let codec = AmqpCodec::new(FrameConfig::for_frame_max(config.frame_max));

        let mut writer = FramedWrite::new(write_half, codec.clone());
        let write_task = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                if let Err(err) = write_batch(&mut writer, batch).await {
                    warn!(error = %err, "frame write failed");
                    return;
                }
            }
            debug!("writer finished");
        });

        let mut reader = FramedRead::new(read_half, codec);
        let dispatcher = Arc::clone(&connection.dispatcher);
        let factory = Arc::clone(&connection.factory);
        let reporter = connection.reporter.clone();
        let read_task = tokio::spawn(async move {
            while let Some(next) = reader.next().await {
                match next {
                    Ok(frame) => {
                        let channel_id = frame.channel;
                        if let Err(err) = route(&dispatcher, frame) {
                            reporter.report(channel_id, err);
                        }
                    }
                    Err(err) => {
                        reporter.report(CONNECTION, ChannelError::Frame(err));
                        break;
                    }
                }
            }
            info!("connection closed");
            factory.connection_lost();
            dispatcher.shutdown();
        });

        connection.tasks.push(read_task);
        connection.tasks.push(write_task);
        connection
    }

    /// Open a new channel.
    pub async fn open_channel(&self) -> Result<Channel> {
        self.factory.open().await
    }

    /// Route one inbound frame to its channel.
    ///
    /// Heartbeats and connection-level frames are not the channel layer's
    /// concern and are skipped.
    pub fn dispatch(&self, frame: Frame) -> Result<()> {
        route(&self.dispatcher, frame)
    }

    /// The fault stream. Only the first call returns it.
    pub fn take_faults(&mut self) -> Option<mpsc::UnboundedReceiver<Fault>> {
        self.faults.take()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Fail every open channel, as if the transport had dropped.
    pub fn close(&self) {
        self.factory.connection_lost();
        self.dispatcher.shutdown();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Frames of one batch are written back to back, then flushed.
async fn write_batch<W>(
    writer: &mut FramedWrite<W, AmqpCodec>,
    batch: Vec<Frame>,
) -> std::result::Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    for frame in batch {
        writer.feed(frame).await?;
    }
    writer.flush().await
}

fn route(dispatcher: &Dispatcher, frame: Frame) -> Result<()> {
    if matches!(frame.body, FrameBody::Heartbeat) {
        trace!("heartbeat");
        return Ok(());
    }
    if is_connection(frame.channel) {
        debug!(kind = ?frame.kind(), "skipping connection-level frame");
        return Ok(());
    }
    dispatcher.dispatch(frame)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::future::Future;

    use amqprims_frame::Method;

    use super::*;
    use crate::sender::testing::RecordingSink;

    /// A connection whose outbound frames are recorded and whose inbound
    /// frames are fed by hand.
    pub(crate) struct Loopback {
        pub(crate) connection: Connection,
        pub(crate) sink: Arc<RecordingSink>,
        pub(crate) faults: mpsc::UnboundedReceiver<Fault>,
    }

    impl Loopback {
        pub(crate) fn new() -> Self {
            Self::with_config(ConnectionConfig::default())
        }

        pub(crate) fn with_config(config: ConnectionConfig) -> Self {
            let sink = Arc::new(RecordingSink::default());
            let mut connection = Connection::new(sink.clone(), config);
            let faults = connection.take_faults().unwrap();
            Self {
                connection,
                sink,
                faults,
            }
        }

        pub(crate) fn sent(&self) -> Vec<Frame> {
            self.sink.frames()
        }

        pub(crate) fn last_method(&self) -> Method {
            match self.sent().last().and_then(Frame::as_method) {
                Some(method) => method.clone(),
                None => panic!("no method frame sent"),
            }
        }

        pub(crate) fn feed(&self, frames: Vec<Frame>) {
            for frame in frames {
                self.connection.dispatch(frame).unwrap();
            }
        }

        /// Drive `call` while answering its request with `reply`.
        pub(crate) async fn serve<F, R>(&self, call: F, reply: R) -> F::Output
        where
            F: Future,
            R: FnOnce(&Frame) -> Vec<Frame>,
        {
            let respond = async {
                settle().await;
                let request = self.sent().last().cloned().unwrap();
                self.feed(reply(&request));
            };
            let (output, ()) = tokio::join!(call, respond);
            output
        }

        pub(crate) async fn open(&self) -> Channel {
            self.serve(self.connection.open_channel(), |request| {
                vec![Frame::method(request.channel, Method::ChannelOpenOk)]
            })
            .await
            .unwrap()
        }
    }

    pub(crate) async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }
}
