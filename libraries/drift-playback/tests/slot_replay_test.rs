//! Replay orchestration against scripted pipelines

mod common;

use common::{EventLog, FakePlayer};
use drift_playback::{
    PlaybackError, PlaybackState, Player, PlayerEvent, SlotPlayer,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Slot whose factory records every pipeline it builds
fn scripted_slot() -> (Arc<SlotPlayer>, Arc<Mutex<Vec<Arc<FakePlayer>>>>) {
    let built: Arc<Mutex<Vec<Arc<FakePlayer>>>> = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&built);
    let slot = SlotPlayer::new(move || {
        let fake = FakePlayer::new();
        record.lock().unwrap().push(Arc::clone(&fake));
        let player: Arc<dyn Player> = fake;
        Ok(player)
    });
    (slot, built)
}

fn pipeline(built: &Mutex<Vec<Arc<FakePlayer>>>, index: usize) -> Arc<FakePlayer> {
    Arc::clone(&built.lock().unwrap()[index])
}

// ==================== first play ====================

#[test]
fn first_play_builds_one_pipeline() {
    let (slot, built) = scripted_slot();
    slot.play().unwrap();

    assert_eq!(built.lock().unwrap().len(), 1);
    assert_eq!(slot.state(), PlaybackState::Playing);
    assert_eq!(slot.live_pipelines(), 1);

    let first = pipeline(&built, 0);
    assert_eq!(first.play_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.fade_time(), 1.0, "stored default applied");
}

// ==================== replay ====================

#[test]
fn replay_runs_two_pipelines_until_the_old_fade_lands() {
    let (slot, built) = scripted_slot();
    slot.set_volume(0.7);
    slot.set_fade_time(1.5);

    slot.play().unwrap();
    slot.play().unwrap();

    assert_eq!(built.lock().unwrap().len(), 2, "replay builds a successor");
    assert_eq!(slot.live_pipelines(), 2, "old and new overlap");

    let first = pipeline(&built, 0);
    let second = pipeline(&built, 1);
    assert!(first.fade_out_requested(), "old pipeline fades, not stops");
    assert_eq!(first.state(), PlaybackState::Playing, "still audible");
    assert_eq!(second.state(), PlaybackState::Playing);
    assert!((second.volume() - 0.7).abs() < 1e-6, "volume carried over");
    assert!((second.fade_time() - 1.5).abs() < 1e-6, "fade carried over");

    first.finish_fade_out();
    assert_eq!(slot.live_pipelines(), 1, "landed fade frees the old one");
    assert_eq!(first.state(), PlaybackState::Closed, "retired and closed");
}

#[test]
fn zero_fade_replay_closes_the_old_pipeline_immediately() {
    let (slot, built) = scripted_slot();
    slot.set_fade_time(0.0);

    slot.play().unwrap();
    slot.play().unwrap();

    let first = pipeline(&built, 0);
    assert!(!first.fade_out_requested(), "no ramp with a zero fade time");
    assert_eq!(first.state(), PlaybackState::Closed);
    assert_eq!(slot.live_pipelines(), 1);
    assert_eq!(built.lock().unwrap().len(), 2);
}

#[test]
fn captured_settings_transfer_to_the_successor() {
    let (slot, built) = scripted_slot();
    slot.play().unwrap();
    slot.set_volume(0.35);
    slot.set_fade_time(2.0);

    slot.play().unwrap();
    let second = pipeline(&built, 1);
    assert!((second.volume() - 0.35).abs() < 1e-6, "got {}", second.volume());
    assert!((second.fade_time() - 2.0).abs() < 1e-6);
}

// ==================== in-place paths ====================

#[test]
fn paused_backing_resumes_in_place() {
    let (slot, built) = scripted_slot();
    slot.play().unwrap();
    slot.pause().unwrap();
    assert_eq!(slot.state(), PlaybackState::Paused);

    slot.play().unwrap();
    assert_eq!(built.lock().unwrap().len(), 1, "no replacement pipeline");
    let first = pipeline(&built, 0);
    assert_eq!(first.resume_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.state(), PlaybackState::Playing);
}

#[test]
fn stopped_backing_restarts_in_place() {
    let (slot, built) = scripted_slot();
    slot.play().unwrap();
    slot.stop().unwrap();
    assert_eq!(slot.state(), PlaybackState::Stopped);

    slot.play().unwrap();
    assert_eq!(built.lock().unwrap().len(), 1, "no replacement pipeline");
    let first = pipeline(&built, 0);
    assert_eq!(first.play_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn finished_stream_restarts_in_place() {
    let (slot, built) = scripted_slot();
    slot.play().unwrap();

    let first = pipeline(&built, 0);
    first.emit_end_of_stream();
    assert_eq!(slot.state(), PlaybackState::Stopped);

    slot.play().unwrap();
    assert_eq!(built.lock().unwrap().len(), 1);
    assert_eq!(first.play_calls.load(Ordering::SeqCst), 2);
}

// ==================== events ====================

#[test]
fn old_pipeline_events_stay_private_after_replay() {
    let (slot, built) = scripted_slot();
    slot.set_fade_time(1.5);
    let log = EventLog::new();
    slot.add_listener(log.clone());

    slot.play().unwrap();
    slot.play().unwrap();

    let first = pipeline(&built, 0);
    first.finish_fade_out();

    let events = log.events();
    assert_eq!(
        log.count(|e| matches!(e, PlayerEvent::Started { .. })),
        2,
        "both starts surface: {events:?}"
    );
    assert_eq!(
        log.count(|e| matches!(e, PlayerEvent::Stopped { .. })),
        0,
        "the retired pipeline's stop stays private: {events:?}"
    );
    for event in &events {
        assert_eq!(event.player(), slot.id(), "slot identity on every event");
    }
}

#[test]
fn successor_events_surface_under_the_slot_identity() {
    let (slot, built) = scripted_slot();
    slot.set_fade_time(0.0);
    let log = EventLog::new();
    slot.add_listener(log.clone());

    slot.play().unwrap();
    slot.play().unwrap();

    let second = pipeline(&built, 1);
    second.emit_end_of_stream();
    assert_eq!(
        log.count(|e| matches!(e, PlayerEvent::EndOfStream { .. })),
        1,
        "the live pipeline's events flow through"
    );
}

// ==================== factory failures ====================

#[test]
fn factory_error_leaves_the_slot_recoverable() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let slot = SlotPlayer::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(PlaybackError::device("transient device loss"));
        }
        let player: Arc<dyn Player> = FakePlayer::new();
        Ok(player)
    });

    let err = slot.play().unwrap_err();
    assert!(matches!(err, PlaybackError::Device(_)));
    assert_eq!(slot.state(), PlaybackState::Stopped);

    slot.play().unwrap();
    assert_eq!(slot.state(), PlaybackState::Playing);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

// ==================== teardown ====================

#[test]
fn close_reaps_backing_and_retired_pipelines() {
    let (slot, built) = scripted_slot();
    slot.set_fade_time(1.5);
    let log = EventLog::new();
    slot.add_listener(log.clone());

    slot.play().unwrap();
    slot.play().unwrap();
    assert_eq!(slot.live_pipelines(), 2);

    slot.close().unwrap();
    assert_eq!(slot.state(), PlaybackState::Closed);
    assert_eq!(slot.live_pipelines(), 0);

    let first = pipeline(&built, 0);
    let second = pipeline(&built, 1);
    assert_eq!(first.state(), PlaybackState::Closed);
    assert_eq!(second.state(), PlaybackState::Closed);
    assert_eq!(
        log.count(|e| matches!(e, PlayerEvent::Closed { .. })),
        1,
        "one Closed under the slot id"
    );
}
