//! Channel lifecycle integration tests
//!
//! Load / play / pause / stop / seek / unload / update against mock devices.

mod helpers;

use helpers::{ch, of_type, settle, track, Harness};
use onair_common::events::{ChannelState, PlayoutEvent};
use onair_common::CuePoints;
use onair_playout::device::DeviceError;
use onair_playout::notify::NotificationLevel;
use onair_playout::{EngineSettings, Error, PlayOutcome};
use std::sync::Arc;

fn cued_track(id: &str) -> onair_common::Track {
    track(id, 60.0).with_cue_points(CuePoints::new(10.0, Some(40.0), 2.0, 3.0).unwrap())
}

#[tokio::test]
async fn test_load_leaves_channel_ready_at_cue_start() {
    let mut h = Harness::new();
    let a = ch("A");

    let view = h.engine.load_track(&a, cued_track("t1")).await.unwrap();

    assert_eq!(view.state, ChannelState::Ready);
    assert!(!view.is_playing());
    assert_eq!(view.position, 10.0);
    assert_eq!(view.duration, 60.0);
    assert_eq!(view.current_track.as_ref().unwrap().id, "t1");

    let device = h.device("A");
    assert_eq!(device.state().binds, 1);
    assert_eq!(device.state().position, 10.0);
    assert_eq!(device.state().starts, 0);

    let events = h.drain_events();
    let states: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PlayoutEvent::ChannelStateChanged { new_state, .. } => Some(*new_state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![ChannelState::Loading, ChannelState::Ready]);
    assert_eq!(of_type(&events, "track-loaded").len(), 1);
}

#[tokio::test]
async fn test_zero_size_track_never_reaches_playing() {
    let mut h = Harness::new();
    let a = ch("A");
    let broken = track("t1", 60.0).with_file_size(0);

    let err = h.engine.load_track(&a, broken).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let view = h.engine.get(&a).unwrap();
    assert_eq!(view.state, ChannelState::Error);
    assert!(view.last_error.is_some());
    assert_eq!(h.device("A").state().binds, 0);

    let notes = h.drain_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Error);
    assert_eq!(notes[0].kind.as_deref(), Some("validation"));

    let err = h.engine.play(&a).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(!h.engine.get(&a).unwrap().is_playing());
}

#[tokio::test]
async fn test_empty_path_is_rejected() {
    let h = Harness::new();
    let mut t = track("t1", 10.0);
    t.path = String::new();
    let err = h.engine.load_track(&ch("A"), t).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn test_play_applies_initial_gain() {
    let h = Harness::new();
    let a = ch("A");
    let b = ch("B");

    // Fade-in defined: start silent
    h.engine.load_track(&a, cued_track("t1")).await.unwrap();
    assert_eq!(h.engine.play(&a).await.unwrap(), PlayOutcome::Started);
    assert!(h.engine.get(&a).unwrap().is_playing());
    assert_eq!(h.device("A").state().gain, 0.0);

    // No fade-in: configured volume straight away
    h.engine.set_volume(&b, 0.8).unwrap();
    h.engine.load_track(&b, track("t2", 30.0)).await.unwrap();
    h.engine.play(&b).await.unwrap();
    assert_eq!(h.device("B").state().gain, 0.8);
    assert_eq!(h.engine.get(&b).unwrap().gain, 0.8);
}

#[tokio::test]
async fn test_play_pause_resume() {
    let h = Harness::new();
    let a = ch("A");
    h.engine.load_track(&a, track("t1", 60.0)).await.unwrap();

    assert_eq!(h.engine.play(&a).await.unwrap(), PlayOutcome::Started);
    assert_eq!(h.engine.play(&a).await.unwrap(), PlayOutcome::AlreadyPlaying);
    assert_eq!(h.device("A").state().starts, 1);

    h.engine.tick(&a, 5.0).unwrap();
    let paused = h.engine.pause(&a).await.unwrap();
    assert_eq!(paused.state, ChannelState::Paused);
    assert_eq!(paused.position, 5.0);
    assert!(!h.device("A").state().playing);

    assert_eq!(h.engine.play(&a).await.unwrap(), PlayOutcome::Resumed);
    assert_eq!(h.engine.get(&a).unwrap().position, 5.0);
}

#[tokio::test]
async fn test_stop_rewinds_to_cue_start() {
    let h = Harness::new();
    let a = ch("A");
    h.start(&a, cued_track("t1")).await;
    h.engine.tick(&a, 25.0).unwrap();

    let view = h.engine.stop(&a).await.unwrap();
    assert_eq!(view.state, ChannelState::Ready);
    assert_eq!(view.position, 10.0);
    assert!(!view.is_playing());
    assert_eq!(h.device("A").state().position, 10.0);
}

#[tokio::test]
async fn test_pause_and_stop_need_a_track() {
    let h = Harness::new();
    let a = ch("A");
    assert!(matches!(h.engine.pause(&a).await, Err(Error::InvalidState(_))));
    assert!(matches!(h.engine.stop(&a).await, Err(Error::InvalidState(_))));
    assert!(matches!(h.engine.play(&a).await, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn test_seek_clamps_and_keeps_play_state() {
    let h = Harness::new();
    let a = ch("A");
    h.start(&a, track("t1", 60.0)).await;

    let view = h.engine.seek(&a, 500.0).await.unwrap();
    assert_eq!(view.position, 60.0);
    assert!(view.is_playing());

    let view = h.engine.seek(&a, -3.0).await.unwrap();
    assert_eq!(view.position, 0.0);
    assert!(view.is_playing());

    h.engine.pause(&a).await.unwrap();
    let view = h.engine.seek(&a, 12.5).await.unwrap();
    assert_eq!(view.state, ChannelState::Paused);
    assert_eq!(h.device("A").state().position, 12.5);

    assert!(matches!(
        h.engine.seek(&a, f64::NAN).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_unload_while_playing_resets_channel() {
    let mut h = Harness::new();
    let a = ch("A");
    h.start(&a, track("t1", 100.0)).await;
    h.engine.prebuffer_next(&a, track("t2", 100.0)).unwrap();
    h.engine.tick(&a, 50.0).unwrap();

    let view = h.engine.unload_track(&a).await.unwrap();
    assert_eq!(view.state, ChannelState::Idle);
    assert_eq!(view.position, 0.0);
    assert!(!view.is_playing());
    assert!(view.current_track.is_none());
    assert!(view.next_track.is_none());
    assert_eq!(h.device("A").state().teardowns, 1);

    // Late ticks change nothing and publish nothing
    settle().await;
    h.drain_events();
    h.engine.tick(&a, 99.9).unwrap();
    h.engine.tick(&a, 100.0).unwrap();
    settle().await;
    assert!(h.drain_events().is_empty());
    assert_eq!(h.engine.get(&a).unwrap().position, 0.0);
}

#[tokio::test]
async fn test_unknown_channel() {
    let h = Harness::new();
    let z = ch("Z");
    assert!(matches!(h.engine.get(&z), Err(Error::UnknownChannel(_))));
    assert!(matches!(
        h.engine.load_track(&z, track("t1", 10.0)).await,
        Err(Error::UnknownChannel(_))
    ));
    assert!(matches!(h.engine.tick(&z, 1.0), Err(Error::UnknownChannel(_))));
}

#[tokio::test]
async fn test_loading_one_channel_leaves_others_untouched() {
    let h = Harness::new();
    let a = ch("A");
    let b = ch("B");
    h.start(&b, track("tb", 120.0)).await;
    h.engine.tick(&b, 30.0).unwrap();
    let b_before = h.engine.get(&b).unwrap();

    h.engine.load_track(&a, track("ta", 60.0)).await.unwrap();
    h.engine.play(&a).await.unwrap();
    h.engine.unload_track(&a).await.unwrap();

    let b_after = h.engine.get(&b).unwrap();
    assert!(Arc::ptr_eq(&b_before, &b_after));
    assert_eq!(h.device("B").state().binds, 1);
}

#[tokio::test]
async fn test_set_track_without_playing_skips_loaded_track() {
    let h = Harness::new();
    let a = ch("A");
    h.engine
        .set_track_without_playing(&a, track("t1", 60.0))
        .await
        .unwrap();
    h.engine
        .set_track_without_playing(&a, track("t1", 60.0))
        .await
        .unwrap();
    assert_eq!(h.device("A").state().binds, 1);
    assert_eq!(h.loader.fetches(), 1);

    let view = h
        .engine
        .set_track_without_playing(&a, track("t2", 60.0))
        .await
        .unwrap();
    assert_eq!(view.current_track.as_ref().unwrap().id, "t2");
    assert_eq!(view.state, ChannelState::Ready);
}

#[tokio::test]
async fn test_update_track_while_playing_is_metadata_only() {
    let h = Harness::new();
    let a = ch("A");
    h.start(&a, track("t1", 60.0)).await;
    h.engine.tick(&a, 20.0).unwrap();

    let renamed = track("t1", 60.0).with_title("Renamed");
    let view = h.engine.update_track(&a, renamed).await.unwrap();

    assert!(view.is_playing());
    assert_eq!(view.position, 20.0);
    assert_eq!(view.current_track.as_ref().unwrap().title, "Renamed");
    assert_eq!(h.device("A").state().binds, 1);
}

#[tokio::test]
async fn test_update_track_rebinds_new_locator_keeping_playhead() {
    let h = Harness::new();
    let a = ch("A");
    h.engine.load_track(&a, track("t1", 60.0)).await.unwrap();
    h.engine.seek(&a, 15.0).await.unwrap();

    let mut moved = track("t1", 60.0);
    moved.path = "archive/t1.mp3".to_string();
    let view = h.engine.update_track(&a, moved).await.unwrap();

    assert_eq!(view.state, ChannelState::Ready);
    assert_eq!(view.position, 15.0);
    assert_eq!(view.current_track.as_ref().unwrap().path, "archive/t1.mp3");
    assert_eq!(h.device("A").state().binds, 2);
    assert_eq!(h.device("A").state().position, 15.0);
}

#[tokio::test]
async fn test_update_track_with_new_identity_reloads() {
    let h = Harness::new();
    let a = ch("A");
    h.engine.load_track(&a, cued_track("t1")).await.unwrap();
    h.engine.seek(&a, 30.0).await.unwrap();

    let view = h.engine.update_track(&a, track("t2", 90.0)).await.unwrap();
    assert_eq!(view.current_track.as_ref().unwrap().id, "t2");
    assert_eq!(view.position, 0.0);
    assert_eq!(view.duration, 90.0);
    assert_eq!(h.device("A").state().binds, 2);
}

#[tokio::test]
async fn test_set_volume_clamps_and_reapplies_gain() {
    let h = Harness::new();
    let a = ch("A");
    h.start(&a, track("t1", 60.0)).await;

    let view = h.engine.set_volume(&a, 1.7).unwrap();
    assert_eq!(view.volume, 1.0);

    let view = h.engine.set_volume(&a, 0.25).unwrap();
    assert_eq!(view.volume, 0.25);
    assert_eq!(view.gain, 0.25);
    assert_eq!(h.device("A").state().gain, 0.25);

    assert!(matches!(
        h.engine.set_volume(&a, f64::INFINITY),
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_resource_failure_surfaces_once() {
    let mut h = Harness::new();
    let a = ch("A");
    let mut corrupt = track("t1", 60.0);
    corrupt.path = "corrupt.mp3".to_string();

    let err = h.engine.load_track(&a, corrupt).await.unwrap_err();
    assert!(matches!(err, Error::ResourceLoad(_)));

    let view = h.engine.get(&a).unwrap();
    assert_eq!(view.state, ChannelState::Error);
    assert_eq!(h.device("A").state().binds, 0);

    let notes = h.drain_notifications();
    let errors: Vec<_> = notes
        .iter()
        .filter(|n| n.level == NotificationLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind.as_deref(), Some("resource_load"));

    // A new load recovers the channel
    h.engine.load_track(&a, track("t2", 60.0)).await.unwrap();
    let view = h.engine.get(&a).unwrap();
    assert_eq!(view.state, ChannelState::Ready);
    assert!(view.last_error.is_none());
}

#[tokio::test]
async fn test_bind_failure_puts_channel_in_error() {
    let h = Harness::new();
    let a = ch("A");
    h.device("A").state().fail_bind = Some(DeviceError::Disconnected("unplugged".into()));

    let err = h.engine.load_track(&a, track("t1", 60.0)).await.unwrap_err();
    assert!(matches!(err, Error::ResourceLoad(_)));
    assert_eq!(h.engine.get(&a).unwrap().state, ChannelState::Error);
}

#[tokio::test]
async fn test_sink_failure_still_plays() {
    let mut settings = EngineSettings::with_channels(["A", "B"]);
    settings
        .output_sinks
        .insert(ch("A"), "studio-main".to_string());
    let mut h = Harness::with_settings(settings);
    let a = ch("A");
    h.device("A").state().fail_sink = true;

    h.engine.load_track(&a, track("t1", 60.0)).await.unwrap();
    h.drain_notifications();
    assert_eq!(h.engine.play(&a).await.unwrap(), PlayOutcome::Started);
    assert!(h.engine.get(&a).unwrap().is_playing());

    let notes = h.drain_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
    assert_eq!(notes[0].kind.as_deref(), Some("device_bind"));
}

#[tokio::test]
async fn test_configured_sink_is_bound() {
    let mut settings = EngineSettings::with_channels(["A"]);
    settings.output_sinks.insert(ch("A"), "studio-fx".to_string());
    let h = Harness::with_settings(settings);
    let a = ch("A");

    h.start(&a, track("t1", 60.0)).await;
    assert_eq!(h.device("A").state().sink.as_deref(), Some("studio-fx"));
}

#[tokio::test]
async fn test_play_after_end_rewinds() {
    let h = Harness::new();
    let a = ch("A");
    h.start(&a, cued_track("t1")).await;
    h.sweep(&a, 10.0, 40.0, 1.0);
    assert_eq!(h.engine.get(&a).unwrap().state, ChannelState::Ended);

    assert_eq!(h.engine.play(&a).await.unwrap(), PlayOutcome::Started);
    let view = h.engine.get(&a).unwrap();
    assert!(view.is_playing());
    assert_eq!(view.position, 10.0);
    assert_eq!(h.device("A").state().position, 10.0);
}

#[tokio::test]
async fn test_play_track_loads_and_starts() {
    let h = Harness::new();
    let a = ch("A");
    let outcome = h.engine.play_track(&a, track("t1", 60.0)).await.unwrap();
    assert_eq!(outcome, PlayOutcome::Started);
    assert!(h.engine.get(&a).unwrap().is_playing());
}

#[tokio::test]
async fn test_snapshot_in_registry_order() {
    let h = Harness::with_settings(EngineSettings::with_channels(["B", "A", "cartwall"]));
    let names: Vec<_> = h
        .engine
        .snapshot()
        .iter()
        .map(|v| v.channel.to_string())
        .collect();
    assert_eq!(names, vec!["B", "A", "cartwall"]);
}
