// SPDX-License-Identifier: GPL-3.0-only

//! Capture loop thread
//!
//! The session runs on its own thread so the viewer never blocks on frame
//! acquisition or integration. The viewer talks to it only through the
//! command and event channels, plus the shared [`VolumeHandle`].

use super::commands::{
    FrameUpdate, SessionCommandSender, SessionEvent, SessionEventReceiver, SessionEventSender,
};
use super::session::{ReconstructionSession, VolumeHandle};
use crate::backends::engine::ReconstructionEngine;
use crate::errors::{FusionError, FusionResult};
use futures::channel::mpsc;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Returned by a loop iteration to keep going or stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Owns a loop thread and its stop signal
///
/// The closure runs until it returns [`LoopAction::Stop`] or [`stop`](Self::stop)
/// is called. Dropping the controller stops and joins the thread.
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %thread_name, "Capture loop thread started");

            while !thread_stop.load(Ordering::SeqCst) {
                if loop_fn() == LoopAction::Stop {
                    debug!(name = %thread_name, "Loop requested stop");
                    break;
                }
            }

            info!(name = %thread_name, "Capture loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop without waiting for it
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Signal the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for a loop that stops itself
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Capture loop thread finished");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "Capture loop dropped, stopping");
            self.stop();
        }
    }
}

/// A started session running on the capture loop thread
pub struct SessionRunner<E: ReconstructionEngine> {
    controller: CaptureLoopController,
    commands: SessionCommandSender,
    events: SessionEventReceiver,
    volume: VolumeHandle<E>,
}

impl<E: ReconstructionEngine + 'static> SessionRunner<E> {
    /// Start `session` and tick it every `tick_interval` on a new thread
    ///
    /// `event_capacity` bounds the event queue. Frame events are dropped
    /// while the queue is full; command results always wait for room.
    pub fn spawn(
        mut session: ReconstructionSession<E>,
        tick_interval: Duration,
        event_capacity: usize,
    ) -> FusionResult<Self> {
        session.start()?;

        let commands = session.command_sender();
        let volume = session.volume().clone();
        let (mut tx, events) = mpsc::channel(event_capacity);
        let name = format!("session-{}", session.id());

        let controller = CaptureLoopController::start(&name, move || {
            let started = Instant::now();
            let action = run_iteration(&mut session, &mut tx);
            if action == LoopAction::Continue {
                if let Some(remaining) = tick_interval.checked_sub(started.elapsed()) {
                    thread::sleep(remaining);
                }
            } else {
                session.shutdown();
            }
            action
        });

        Ok(Self {
            controller,
            commands,
            events,
            volume,
        })
    }
}

impl<E: ReconstructionEngine> SessionRunner<E> {
    /// Queue handle for operator commands
    pub fn commands(&self) -> SessionCommandSender {
        self.commands.clone()
    }

    /// Shared engine handle
    pub fn volume(&self) -> &VolumeHandle<E> {
        &self.volume
    }

    /// Next queued event, without waiting
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.next().now_or_never().flatten()
    }

    /// Block until the next event; `None` once the loop has exited
    pub fn wait_event(&mut self) -> Option<SessionEvent> {
        futures::executor::block_on(self.events.next())
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Stop the loop and shut the session down
    pub fn stop(&mut self) {
        self.controller.stop();
    }
}

fn run_iteration<E: ReconstructionEngine>(
    session: &mut ReconstructionSession<E>,
    tx: &mut SessionEventSender,
) -> LoopAction {
    for result in session.process_pending_commands() {
        let event = match result {
            Ok(outcome) => SessionEvent::CommandCompleted(outcome),
            Err(e) if is_command_fatal(&e) => {
                error!(error = %e, "Command failed, stopping session");
                deliver(tx, SessionEvent::Failed(e));
                return LoopAction::Stop;
            }
            Err(e) => {
                warn!(error = %e, "Command failed");
                SessionEvent::CommandFailed(e)
            }
        };
        if !deliver(tx, event) {
            return LoopAction::Stop;
        }
    }

    match session.tick() {
        Ok(report) if report.has_frame() => {
            let update = FrameUpdate {
                image: Arc::new(session.shaded_image().clone()),
                report,
                tracking: session.tracking(),
                state: session.state(),
            };
            match tx.try_send(SessionEvent::Frame(update)) {
                Ok(()) => LoopAction::Continue,
                Err(e) if e.is_full() => {
                    debug!("Viewer behind, dropping frame");
                    LoopAction::Continue
                }
                Err(_) => LoopAction::Stop,
            }
        }
        Ok(_) => LoopAction::Continue,
        Err(e) if e.is_fatal() => {
            error!(error = %e, "Reconstruction failed, stopping session");
            deliver(tx, SessionEvent::Failed(e));
            LoopAction::Stop
        }
        Err(e) => {
            warn!(error = %e, "Tick failed");
            LoopAction::Continue
        }
    }
}

/// Command failures that leave the volume unusable
fn is_command_fatal(err: &FusionError) -> bool {
    err.is_fatal() && !matches!(err, FusionError::NotRunning(_))
}

/// Send an event, waiting for room; false once the viewer has gone away
fn deliver(tx: &mut SessionEventSender, event: SessionEvent) -> bool {
    use futures::SinkExt;

    match futures::executor::block_on(tx.send(event)) {
        Ok(()) => true,
        Err(_) => {
            debug!("Event receiver dropped");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_loop_stops_itself() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut controller = CaptureLoopController::start("test", move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });
        controller.join();
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stop_signal_ends_loop() {
        let mut controller = CaptureLoopController::start("test", || {
            thread::sleep(Duration::from_millis(1));
            LoopAction::Continue
        });
        assert!(controller.is_running());
        controller.stop();
        assert!(!controller.is_running());
    }

    #[test]
    fn test_not_running_command_is_not_fatal() {
        assert!(!is_command_fatal(&FusionError::NotRunning(
            super::super::SessionState::ShutDown
        )));
        assert!(is_command_fatal(&FusionError::LockPoisoned));
    }
}
