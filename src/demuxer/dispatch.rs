use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use super::executor::Executor;
use super::DemuxerState;
use crate::av::{AudioConfig, DrmInitData, ElementaryStreamPacket, VideoConfig};
use crate::error::{DemuxError, Result};

/// Notifications delivered to the message listener.
#[derive(Debug)]
pub enum Message {
    /// The initial configuration has been delivered.
    Initialized,
    /// One elementary stream packet, selected by the demuxer type.
    Packet(ElementaryStreamPacket),
    /// Every packet before the end-of-stream mark has been delivered.
    EndOfStream,
    /// Terminal failure; nothing else follows.
    Error(DemuxError),
}

/// Everything the worker hands to the caller travels as one of these.
#[derive(Debug)]
pub enum DemuxEvent {
    /// For the video config listener.
    VideoConfig(VideoConfig),
    /// For the audio config listener.
    AudioConfig(AudioConfig),
    /// For the DRM init data listener.
    DrmInitData(DrmInitData),
    /// For the message listener.
    Message(Message),
}

impl DemuxEvent {
    fn name(&self) -> &'static str {
        match self {
            DemuxEvent::VideoConfig(_) => "video config",
            DemuxEvent::AudioConfig(_) => "audio config",
            DemuxEvent::DrmInitData(_) => "drm init data",
            DemuxEvent::Message(Message::Initialized) => "initialized",
            DemuxEvent::Message(Message::Packet(_)) => "packet",
            DemuxEvent::Message(Message::EndOfStream) => "end of stream",
            DemuxEvent::Message(Message::Error(_)) => "error",
        }
    }
}

pub(crate) type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    pub video_config: Option<Listener<VideoConfig>>,
    pub audio_config: Option<Listener<AudioConfig>>,
    pub drm_init_data: Option<Listener<DrmInitData>>,
    pub message: Option<Listener<Message>>,
}

/// State shared between the façade and delivery tasks.
pub(crate) struct DispatchShared {
    pub listeners: Mutex<Listeners>,
    /// Held for the whole of one delivery. Reentrant so a listener may call
    /// back into the façade, `close` included.
    gate: ReentrantMutex<()>,
    generation: AtomicU64,
    closed: AtomicBool,
    state: Mutex<DemuxerState>,
}

impl DispatchShared {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Listeners::default()),
            gate: ReentrantMutex::new(()),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            state: Mutex::new(DemuxerState::Uninitialized),
        }
    }

    pub fn state(&self) -> DemuxerState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: DemuxerState) {
        let mut current = self.state.lock();
        // both are final; close() writes Closed directly
        if !matches!(*current, DemuxerState::Closed | DemuxerState::Errored) {
            *current = state;
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops all future deliveries and waits for the one in flight.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        drop(self.gate.lock());
        *self.state.lock() = DemuxerState::Closed;
    }

    /// Runs on the executor: applies the state change and calls the listener.
    fn deliver(&self, generation: u64, event: DemuxEvent) {
        let _gate = self.gate.lock();
        if self.is_closed() {
            log::trace!("dropping {} after close", event.name());
            return;
        }
        // the worker is gone after a fatal error, so it outlives any flush
        let terminal = matches!(&event, DemuxEvent::Message(Message::Error(e)) if e.is_fatal());
        if generation != self.generation() && !terminal {
            log::trace!("dropping stale {} of generation {}", event.name(), generation);
            return;
        }

        match &event {
            DemuxEvent::Message(Message::Initialized) => self.set_state(DemuxerState::Ready),
            DemuxEvent::Message(Message::Packet(_)) => self.set_state(DemuxerState::Parsing),
            DemuxEvent::Message(Message::EndOfStream) => self.set_state(DemuxerState::Ready),
            DemuxEvent::Message(Message::Error(_)) => self.set_state(DemuxerState::Errored),
            _ => {}
        }

        // clone the callback out so listeners can be replaced from inside one
        match event {
            DemuxEvent::VideoConfig(config) => {
                let listener = self.listeners.lock().video_config.clone();
                if let Some(listener) = listener {
                    listener(config);
                }
            }
            DemuxEvent::AudioConfig(config) => {
                let listener = self.listeners.lock().audio_config.clone();
                if let Some(listener) = listener {
                    listener(config);
                }
            }
            DemuxEvent::DrmInitData(data) => {
                let listener = self.listeners.lock().drm_init_data.clone();
                if let Some(listener) = listener {
                    listener(data);
                }
            }
            DemuxEvent::Message(message) => {
                let listener = self.listeners.lock().message.clone();
                if let Some(listener) = listener {
                    listener(message);
                }
            }
        }
    }
}

/// Worker-side handle posting events tagged with the worker's generation.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    shared: Arc<DispatchShared>,
    executor: Arc<dyn Executor>,
    generation: u64,
}

impl Dispatcher {
    pub fn new(shared: Arc<DispatchShared>, executor: Arc<dyn Executor>, generation: u64) -> Self {
        Self {
            shared,
            executor,
            generation,
        }
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Adopts the generation the façade is currently delivering.
    pub fn sync_generation(&mut self) {
        self.generation = self.shared.generation();
    }

    pub fn post(&self, event: DemuxEvent) -> Result<()> {
        let shared = self.shared.clone();
        let generation = self.generation;
        self.executor
            .post(Box::new(move || shared.deliver(generation, event)))
    }

    pub fn post_message(&self, message: Message) -> Result<()> {
        self.post(DemuxEvent::Message(message))
    }
}
