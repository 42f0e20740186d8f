//! The parsing worker: one thread per demuxer driving the container.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, TryRecvError};

use super::buffer::SharedInputBuffer;
use super::dispatch::{DemuxEvent, Dispatcher, Message};
use super::pull::PullAdapter;
use super::translate::Translator;
use crate::av::{DemuxerType, TimeTicks};
use crate::format::{ContainerFactory, ContainerParser, Progress};
use crate::{DemuxError, Result};

/// Caller-to-worker signals. Fire and forget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Control {
    DataAvailable,
    SetTimestamp(TimeTicks),
    /// The input buffer moved to this generation.
    Flush(u64),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Opening,
    Probing,
    Streaming,
    Stopping,
    Stopped,
    Faulted,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Opening => "opening",
            WorkerState::Probing => "probing",
            WorkerState::Streaming => "streaming",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
            WorkerState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

enum Step {
    Continue,
    /// Nothing to do until the caller signals.
    Idle,
    Exit,
}

pub(crate) struct Worker {
    kind: DemuxerType,
    probe_size: usize,
    buffer: Arc<SharedInputBuffer>,
    factory: ContainerFactory,
    dispatcher: Dispatcher,
    control: Receiver<Control>,
    container: Option<Box<dyn ContainerParser>>,
    translator: Translator,
    offset: TimeTicks,
    pending_flush: Option<u64>,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        kind: DemuxerType,
        probe_size: usize,
        buffer: Arc<SharedInputBuffer>,
        factory: ContainerFactory,
        dispatcher: Dispatcher,
        control: Receiver<Control>,
        offset: TimeTicks,
    ) -> Self {
        Self {
            kind,
            probe_size,
            buffer,
            factory,
            dispatcher,
            control,
            container: None,
            translator: Translator::new(kind, offset),
            offset,
            pending_flush: None,
            state: WorkerState::Opening,
        }
    }

    /// Starts the worker on a named thread.
    pub fn spawn(self, name: &str) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run_guarded())
            .map_err(|e| DemuxError::ThreadStartFailed(e.to_string()))
    }

    fn run_guarded(self) {
        let mut fallback = self.dispatcher.clone();
        if panic::catch_unwind(AssertUnwindSafe(move || self.run())).is_err() {
            log::error!("parsing worker panicked");
            fallback.sync_generation();
            let error = DemuxError::ParseFailed("parsing worker panicked".into());
            if let Err(e) = fallback.post_message(Message::Error(error)) {
                log::debug!("could not report worker panic: {}", e);
            }
        }
    }

    fn run(mut self) {
        log::info!("{} parsing worker started", self.kind.as_str());
        loop {
            if !self.checkpoint() {
                break;
            }
            let step = match self.state {
                WorkerState::Opening => self.open(),
                WorkerState::Probing => self.probe(),
                WorkerState::Streaming => self.stream(),
                WorkerState::Stopping => {
                    self.container = None;
                    self.set_state(WorkerState::Stopped);
                    Step::Continue
                }
                WorkerState::Stopped => Step::Idle,
                WorkerState::Faulted => Step::Exit,
            };
            match step {
                Step::Continue => {}
                Step::Idle => match self.control.recv() {
                    Ok(control) => {
                        if !self.handle(control) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Step::Exit => break,
            }
        }
        self.container = None;
        log::info!("{} parsing worker stopped", self.kind.as_str());
    }

    fn set_state(&mut self, state: WorkerState) {
        log::trace!("worker {} -> {}", self.state, state);
        self.state = state;
    }

    /// Applies one control message. Returns false on close.
    fn handle(&mut self, control: Control) -> bool {
        match control {
            Control::DataAvailable => {}
            Control::SetTimestamp(offset) => {
                log::debug!("timestamp offset set to {:.3}s", offset);
                self.offset = offset;
                self.translator.set_offset(offset);
            }
            Control::Flush(generation) => self.pending_flush = Some(generation),
            Control::Close => return false,
        }
        true
    }

    /// Drains pending control messages without blocking. Returns false when
    /// the worker has to exit; close wins over everything queued with it.
    fn drain_control(&mut self) -> bool {
        let mut keep_running = true;
        loop {
            match self.control.try_recv() {
                Ok(control) => keep_running &= self.handle(control),
                Err(TryRecvError::Empty) => return keep_running,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn checkpoint(&mut self) -> bool {
        if !self.drain_control() {
            return false;
        }
        if let Some(generation) = self.pending_flush.take() {
            log::debug!("worker flushed to generation {} while {}", generation, self.state);
            self.container = None;
            self.dispatcher.set_generation(generation);
            self.set_state(WorkerState::Opening);
        }
        true
    }

    fn post(&self, event: DemuxEvent) -> bool {
        match self.dispatcher.post(event) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("execution context gone, stopping worker: {}", e);
                false
            }
        }
    }

    fn open(&mut self) -> Step {
        let generation = self.dispatcher.generation();
        let mut container = (self.factory)();
        let source = Box::new(PullAdapter::new(self.buffer.clone(), generation));
        match container.open(source) {
            Ok(()) => {
                self.container = Some(container);
                self.translator = Translator::new(self.kind, self.offset);
                self.set_state(WorkerState::Probing);
                Step::Continue
            }
            Err(e) => {
                let error = match e {
                    DemuxError::OpenFailed(_) => e,
                    other => DemuxError::OpenFailed(other.to_string()),
                };
                self.fault(error)
            }
        }
    }

    fn probe(&mut self) -> Step {
        let Some(container) = self.container.as_mut() else {
            self.set_state(WorkerState::Opening);
            return Step::Continue;
        };

        let layout = match container.find_stream_info(self.probe_size) {
            Ok(Progress::Ready(layout)) => layout,
            Ok(Progress::NeedMoreData) => return Step::Idle,
            Err(e) => return self.fault(e),
        };

        let lookup = |index: usize| container.stream_parameters(index).cloned();
        let events = match self.translator.initial_events(&layout, &lookup) {
            Ok(events) => events,
            Err(e) => return self.fault(e),
        };

        log::info!(
            "{} probe complete: {} streams, {} initial records",
            self.kind.as_str(),
            layout.streams.len(),
            events.len()
        );
        for event in events {
            if !self.post(event) {
                return Step::Exit;
            }
        }
        if !self.post(DemuxEvent::Message(Message::Initialized)) {
            return Step::Exit;
        }
        self.set_state(WorkerState::Streaming);
        Step::Continue
    }

    fn stream(&mut self) -> Step {
        let Some(container) = self.container.as_mut() else {
            self.set_state(WorkerState::Opening);
            return Step::Continue;
        };

        match container.read_packet() {
            Ok(Progress::NeedMoreData) => Step::Idle,
            Ok(Progress::Ready(None)) => {
                log::info!("{} stream ended", self.kind.as_str());
                if !self.post(DemuxEvent::Message(Message::EndOfStream)) {
                    return Step::Exit;
                }
                self.set_state(WorkerState::Stopping);
                Step::Continue
            }
            Ok(Progress::Ready(Some(packet))) => {
                // signals sent before these bytes were appended apply to them
                if !self.drain_control() {
                    return Step::Exit;
                }
                if self.pending_flush.is_some() {
                    log::trace!("dropping packet of flushed input");
                    return Step::Continue;
                }
                for event in self.translator.translate_packet(packet) {
                    if !self.post(event) {
                        return Step::Exit;
                    }
                }
                Step::Continue
            }
            Err(e) => self.fault(e),
        }
    }

    /// Reports `error` and ends the worker, unless the error belongs to
    /// input a pending flush discards.
    fn fault(&mut self, error: DemuxError) -> Step {
        if !error.is_fatal() {
            log::warn!("{}", error);
            return Step::Continue;
        }
        if !self.drain_control() {
            return Step::Exit;
        }
        if self.pending_flush.is_some() {
            log::debug!("ignoring error from flushed input: {}", error);
            return Step::Continue;
        }

        log::error!("{} demuxer failed while {}: {}", self.kind.as_str(), self.state, error);
        self.container = None;
        self.set_state(WorkerState::Faulted);
        self.post(DemuxEvent::Message(Message::Error(error)));
        Step::Exit
    }
}
