// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture loop thread

mod common;

use common::{Align, FakeEngine, Script, Step, fake_session, test_config};
use depth_fusion::errors::{EngineError, FusionError, MeshError};
use depth_fusion::pipelines::reconstruction::{
    CommandOutcome, SessionCommand, SessionEvent, SessionRunner, SessionState,
};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(5);

fn next_non_frame(runner: &mut SessionRunner<FakeEngine>) -> Option<SessionEvent> {
    loop {
        match runner.wait_event()? {
            SessionEvent::Frame(_) => continue,
            event => return Some(event),
        }
    }
}

#[test]
fn test_runner_publishes_frames() {
    let script = Script::frames(0, 3);
    let session = fake_session(&script, FakeEngine::default(), &test_config());
    let mut runner = SessionRunner::spawn(session, TICK, 8).unwrap();

    let Some(SessionEvent::Frame(update)) = runner.wait_event() else {
        panic!("expected a frame event");
    };
    assert_eq!(update.state, SessionState::Running);
    assert_eq!(update.report.frame.map(|f| f.frame_number), Some(1));
    assert_eq!(update.image.width, 80);
    assert_eq!(update.image.height, 60);

    runner.stop();
    assert!(!runner.is_running());
}

#[test]
fn test_runner_executes_commands() {
    let script = Script::frames(0, 2);
    let session = fake_session(&script, FakeEngine::default(), &test_config());
    let mut runner = SessionRunner::spawn(session, TICK, 8).unwrap();
    let commands = runner.commands();

    commands.send(SessionCommand::ReloadLastMesh).unwrap();
    assert!(matches!(
        next_non_frame(&mut runner),
        Some(SessionEvent::CommandFailed(FusionError::Mesh(MeshError::NothingSaved)))
    ));

    commands.send(SessionCommand::Reset).unwrap();
    assert!(matches!(
        next_non_frame(&mut runner),
        Some(SessionEvent::CommandCompleted(CommandOutcome::Reset))
    ));
    assert!(runner.is_running(), "command failures are not fatal");

    runner.stop();
}

#[test]
fn test_runner_stops_on_fatal_error() {
    let script = Script::new([Step::Frame(0), Step::Frame(33)]);
    let engine = FakeEngine::scripted([Align::Track, Align::Fail]);
    let session = fake_session(&script, engine, &test_config());
    let mut runner = SessionRunner::spawn(session, TICK, 8).unwrap();

    assert!(matches!(
        next_non_frame(&mut runner),
        Some(SessionEvent::Failed(FusionError::Engine(EngineError::Integration(_))))
    ));
    // Sender dropped with the session once the loop exits
    assert!(next_non_frame(&mut runner).is_none());
    runner.stop();
    assert!(!runner.is_running());
}

#[test]
fn test_runner_survives_idle_sensor() {
    let script = Script::default();
    let session = fake_session(&script, FakeEngine::default(), &test_config());
    let mut runner = SessionRunner::spawn(session, TICK, 8).unwrap();

    std::thread::sleep(Duration::from_millis(30));
    assert!(runner.try_next_event().is_none());
    assert!(runner.is_running());

    script.push(Step::Frame(0));
    assert!(matches!(runner.wait_event(), Some(SessionEvent::Frame(_))));
    runner.stop();
}
