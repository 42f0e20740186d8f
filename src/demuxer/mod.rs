//! # Asynchronous demuxing pipeline
//!
//! A [`Demuxer`] accepts container bytes in arbitrary chunks through
//! [`Demuxer::parse`] and hands elementary stream packets, codec
//! configuration and DRM init data back to the caller. Parsing runs on a
//! dedicated worker thread; every result is posted to the caller's
//! [`Executor`] and delivered there in the order it was produced.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use esdemux::av::DemuxerType;
//! use esdemux::config::Config;
//! use esdemux::demuxer::{Demuxer, Message, MessageLoop};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let demuxer = Demuxer::new(DemuxerType::Video, Config::default());
//! demuxer.set_video_config_listener(|config| println!("{}x{}", config.width, config.height));
//!
//! let dispatcher = Arc::new(MessageLoop::new("player")?);
//! demuxer.init(
//!     |message| {
//!         if let Message::Packet(packet) = message {
//!             println!("packet at {:.3}s", packet.pts);
//!         }
//!     },
//!     dispatcher,
//! )?;
//!
//! let segment = std::fs::read("segment.ts")?;
//! demuxer.parse(&segment)?;
//! demuxer.end_of_stream()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

mod buffer;
mod dispatch;
mod executor;
mod pull;
mod translate;
mod worker;

pub use buffer::{BufferStats, SharedInputBuffer};
pub use dispatch::{DemuxEvent, Message};
pub use executor::{Executor, MessageLoop, PumpedLoop, Task, TokioContext};
pub use pull::PullAdapter;

use dispatch::{DispatchShared, Dispatcher};
use worker::{Control, Worker};

use crate::av::{AudioConfig, DemuxerType, DrmInitData, TimeTicks, VideoConfig};
use crate::config::Config;
use crate::format::ts::TsContainer;
use crate::format::{ContainerFactory, ContainerParser};
use crate::{DemuxError, Result};

/// Lifecycle of a [`Demuxer`] as seen from the caller's thread.
///
/// Changes caused by worker results are applied inside the delivery task on
/// the executor, just before the matching listener runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemuxerState {
    /// Created; `init` not called yet.
    Uninitialized,
    /// The worker is probing the stream layout.
    Initializing,
    /// Configuration delivered, or end of stream reached.
    Ready,
    /// Packets are being delivered.
    Parsing,
    /// Buffered input was dropped; the worker is re-probing.
    Flushing,
    /// `close` was called. Final.
    Closed,
    /// A terminal error was delivered. Final; retrying takes a new demuxer.
    Errored,
}

#[derive(Default)]
struct Inner {
    control: Option<Sender<Control>>,
    worker: Option<JoinHandle<()>>,
    /// Released on the closing thread, never on the worker.
    executor: Option<Arc<dyn Executor>>,
    offset: TimeTicks,
    initialized: bool,
}

/// Demultiplexer façade for one stream-type channel.
///
/// Every method takes `&self` and may be called from any thread, listeners
/// included. Dropping the demuxer closes it.
pub struct Demuxer {
    kind: DemuxerType,
    config: Config,
    factory: ContainerFactory,
    buffer: Arc<SharedInputBuffer>,
    shared: Arc<DispatchShared>,
    inner: Mutex<Inner>,
}

impl Demuxer {
    /// Demuxer over MPEG-TS input.
    pub fn new(kind: DemuxerType, config: Config) -> Self {
        let ts_config = config.clone();
        let factory: ContainerFactory = Arc::new(move || {
            Box::new(TsContainer::with_config(&ts_config)) as Box<dyn ContainerParser>
        });
        Self::with_container(kind, config, factory)
    }

    /// Demuxer over whatever containers `factory` builds.
    pub fn with_container(kind: DemuxerType, config: Config, factory: ContainerFactory) -> Self {
        Self {
            kind,
            config,
            factory,
            buffer: Arc::new(SharedInputBuffer::new()),
            shared: Arc::new(DispatchShared::new()),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Which streams this demuxer delivers.
    pub fn kind(&self) -> DemuxerType {
        self.kind
    }

    /// Registers the message listener and starts the parsing worker. The
    /// configuration records and `Message::Initialized` follow once the
    /// stream layout is known.
    pub fn init<F>(&self, on_message: F, executor: Arc<dyn Executor>) -> Result<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        if self.shared.is_closed() {
            return Err(DemuxError::InvalidState("demuxer is closed".into()));
        }
        if inner.initialized {
            return Err(DemuxError::InvalidState("demuxer already initialized".into()));
        }

        self.shared.listeners.lock().message = Some(Arc::new(on_message));
        self.shared.set_state(DemuxerState::Initializing);

        let generation = self.buffer.generation();
        self.shared.set_generation(generation);
        let (control, receiver) = crossbeam_channel::unbounded();
        let dispatcher = Dispatcher::new(self.shared.clone(), executor.clone(), generation);
        let worker = Worker::new(
            self.kind,
            self.config.probe_size,
            self.buffer.clone(),
            self.factory.clone(),
            dispatcher,
            receiver,
            inner.offset,
        );

        let name = format!("{}-{}", self.config.worker_thread_name, self.kind.as_str());
        match worker.spawn(&name) {
            Ok(handle) => {
                log::info!("{} demuxer initialized, probe size {}", self.kind.as_str(), self.config.probe_size);
                inner.control = Some(control);
                inner.worker = Some(handle);
                inner.executor = Some(executor);
                inner.initialized = true;
                Ok(())
            }
            Err(e) => {
                log::error!("{} demuxer could not start: {}", self.kind.as_str(), e);
                self.shared.set_state(DemuxerState::Errored);
                Err(e)
            }
        }
    }

    fn notify(&self, inner: &Inner, control: Control) {
        if let Some(sender) = &inner.control {
            if sender.send(control).is_err() {
                log::trace!("worker gone, dropped {:?}", control);
            }
        }
    }

    /// Queues container bytes for parsing. An empty slice marks the end of
    /// the stream.
    pub fn parse(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return self.end_of_stream();
        }
        if self.shared.is_closed() {
            return Err(DemuxError::Closed);
        }
        let inner = self.inner.lock();
        self.buffer.append(data)?;
        self.notify(&inner, Control::DataAvailable);
        Ok(())
    }

    /// No more bytes follow until the next flush.
    pub fn end_of_stream(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Err(DemuxError::Closed);
        }
        let inner = self.inner.lock();
        self.buffer.mark_end_of_stream()?;
        self.notify(&inner, Control::DataAvailable);
        Ok(())
    }

    /// Drops buffered input and every result not yet delivered. The worker
    /// discards its parser state and probes the bytes that follow.
    pub fn flush(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Err(DemuxError::Closed);
        }
        let inner = self.inner.lock();
        let generation = self.buffer.flush();
        self.shared.set_generation(generation);
        if inner.initialized {
            self.shared.set_state(DemuxerState::Flushing);
        }
        self.notify(&inner, Control::Flush(generation));
        Ok(())
    }

    /// Sets the offset, in seconds, added to the timestamps of packets the
    /// worker translates after it sees the call.
    pub fn set_timestamp(&self, timestamp: TimeTicks) -> Result<()> {
        if self.shared.is_closed() {
            return Err(DemuxError::Closed);
        }
        let mut inner = self.inner.lock();
        inner.offset = timestamp;
        self.notify(&inner, Control::SetTimestamp(timestamp));
        Ok(())
    }

    /// Stops the worker and waits for it and for any delivery in flight.
    /// No listener runs after this returns. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let (control, worker, executor) = {
            let mut inner = self.inner.lock();
            (inner.control.take(), inner.worker.take(), inner.executor.take())
        };
        if self.shared.is_closed() && control.is_none() && worker.is_none() {
            return Ok(());
        }

        // waits for a delivery in flight; none starts after this
        self.shared.close();

        if let Some(sender) = control {
            if sender.send(Control::Close).is_err() {
                log::trace!("worker already gone at close");
            }
        }
        self.buffer.close();

        if let Some(handle) = worker {
            if handle.thread().id() == thread::current().id() {
                log::warn!("close called on the parsing worker, not joining");
            } else if handle.join().is_err() {
                log::error!("parsing worker thread panicked");
            }
        }
        drop(executor);

        log::info!("{} demuxer closed", self.kind.as_str());
        Ok(())
    }

    /// Replaces the video config listener. Takes effect for later deliveries.
    pub fn set_video_config_listener<F>(&self, listener: F)
    where
        F: Fn(VideoConfig) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().video_config = Some(Arc::new(listener));
    }

    /// Replaces the audio config listener.
    pub fn set_audio_config_listener<F>(&self, listener: F)
    where
        F: Fn(AudioConfig) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().audio_config = Some(Arc::new(listener));
    }

    /// Replaces the DRM init data listener.
    pub fn set_drm_init_data_listener<F>(&self, listener: F)
    where
        F: Fn(DrmInitData) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().drm_init_data = Some(Arc::new(listener));
    }

    /// Replaces the listener given to [`Demuxer::init`].
    pub fn set_message_listener<F>(&self, listener: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.shared.listeners.lock().message = Some(Arc::new(listener));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DemuxerState {
        self.shared.state()
    }

    /// Bytes handed to [`Demuxer::parse`] the worker has not pulled yet.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Byte counters of the input buffer.
    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats()
    }
}

impl fmt::Debug for Demuxer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Demuxer")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("buffered", &self.buffered_bytes())
            .finish()
    }
}

impl Drop for Demuxer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error closing demuxer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            probe_size: 64 * 1024,
            ..Config::default()
        }
    }

    #[test]
    fn test_lifecycle_errors() {
        let demuxer = Demuxer::new(DemuxerType::Audio, config());
        assert_eq!(demuxer.state(), DemuxerState::Uninitialized);

        let pump = Arc::new(PumpedLoop::new());
        demuxer.init(|_| {}, pump.clone()).unwrap();
        assert_eq!(demuxer.state(), DemuxerState::Initializing);
        let err = demuxer.init(|_| {}, pump.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        demuxer.close().unwrap();
        demuxer.close().unwrap();
        assert_eq!(demuxer.state(), DemuxerState::Closed);
        assert!(matches!(demuxer.parse(&[0x47]), Err(DemuxError::Closed)));
        assert!(matches!(demuxer.flush(), Err(DemuxError::Closed)));
        assert!(matches!(demuxer.set_timestamp(1.0), Err(DemuxError::Closed)));
        assert_eq!(
            demuxer.init(|_| {}, pump).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_parse_before_init_is_buffered() {
        let demuxer = Demuxer::new(DemuxerType::Video, config());
        demuxer.parse(&[0x47; 376]).unwrap();
        assert_eq!(demuxer.buffered_bytes(), 376);
        demuxer.flush().unwrap();
        assert_eq!(demuxer.buffered_bytes(), 0);
        assert_eq!(demuxer.state(), DemuxerState::Uninitialized);
        assert_eq!(demuxer.buffer_stats().discarded, 376);
    }

    #[test]
    fn test_drop_joins_worker() {
        let pump = Arc::new(PumpedLoop::new());
        {
            let demuxer = Demuxer::new(DemuxerType::Muxed, config());
            demuxer.init(|_| {}, pump.clone()).unwrap();
            demuxer.parse(&[0x47; 188]).unwrap();
        }
        // nothing queued after close may ever run a listener
        pump.run_until(|| false, Duration::from_millis(10));
    }
}
