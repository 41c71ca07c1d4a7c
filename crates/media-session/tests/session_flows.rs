//! Integration tests for the media session lifecycle.
//!
//! Join, local feed, streaming, mute/video/screen toggles and every way a
//! session ends, driven through `MediaSessionHandle` against the mocks.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use media_session::media::MediaProducer;
use media_session::{SessionConfig, SessionError, SessionState};
use ms_test_utils::*;
use serde_json::json;
use signaling_protocol::{events, MediaKind, PushEvent};
use std::sync::Arc;
use std::time::Duration;

const ROOM: &str = "abc-1234-xyz";

/// Producers of `kind` still open on the engine.
fn open_producers_of(harness: &SessionHarness, kind: MediaKind) -> Vec<Arc<MockProducer>> {
    harness
        .engine
        .producers()
        .into_iter()
        .filter(|p| !p.is_closed() && p.track().kind() == kind)
        .collect()
}

// ============================================================================
// Join
// ============================================================================

#[tokio::test]
async fn test_join_reaches_joined_and_loads_capabilities() {
    let harness = SessionHarness::start();

    harness.handle.join(" alice ", ROOM, true, true).await.unwrap();

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Joined { streaming: false });
    assert!(snapshot.is_joined());
    assert_eq!(snapshot.user_id.unwrap().as_str(), "alice");
    assert_eq!(snapshot.room_id.unwrap().as_str(), ROOM);
    assert!(!snapshot.is_owner);
    assert!(harness.engine.is_loaded());
    assert_eq!(
        harness.signaling.payloads(events::JOIN),
        vec![json!({ "userId": "alice", "roomId": ROOM })]
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_blank_ids_are_a_no_op() {
    let harness = SessionHarness::start();

    harness.handle.join("   ", ROOM, true, true).await.unwrap();
    harness.handle.join("alice", "\t", true, true).await.unwrap();

    assert_eq!(harness.handle.snapshot().state, SessionState::Idle);
    assert_eq!(harness.signaling.count(events::JOIN), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_second_join_is_ignored() {
    let harness = SessionHarness::start();

    harness.handle.join("alice", ROOM, true, true).await.unwrap();
    harness.handle.join("alice", "other-room", true, true).await.unwrap();

    assert_eq!(harness.signaling.count(events::JOIN), 1);
    assert_eq!(harness.handle.snapshot().room_id.unwrap().as_str(), ROOM);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_rejected_join_stays_idle_and_can_retry() {
    let harness = SessionHarness::start();
    harness.signaling.respond_once(events::JOIN, json!("error"));

    let err = harness.handle.join("alice", ROOM, true, true).await.unwrap_err();
    assert!(matches!(err, SessionError::JoinFailure(_)));
    assert!(err.is_session_fatal());

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.last_error.as_deref(), Some("Could not join the room"));

    // Manual retry on the same instance
    harness.handle.join("alice", ROOM, true, true).await.unwrap();
    assert!(harness.handle.snapshot().is_joined());
    assert_eq!(harness.signaling.count(events::JOIN), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_join_timeout_is_a_join_failure() {
    let harness = SessionHarness::start();
    harness.signaling.time_out(events::JOIN);

    let err = harness.handle.join("alice", ROOM, true, true).await.unwrap_err();
    assert!(matches!(err, SessionError::JoinFailure(_)));
    assert_eq!(harness.handle.snapshot().state, SessionState::Idle);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_capability_failure_leaves_room_and_stays_idle() {
    let engine = MockMediaEngine::new();
    engine.fail_load();
    let harness = SessionHarness::start_with(
        SessionConfig::default(),
        MockSignaling::new(),
        engine,
        MockCapture::new(),
    );

    let err = harness.handle.join("alice", ROOM, true, true).await.unwrap_err();
    assert!(matches!(err, SessionError::JoinFailure(_)));
    assert_eq!(harness.handle.snapshot().state, SessionState::Idle);
    assert_eq!(harness.signaling.count(events::LEAVE_ROOM), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_join_remembers_display_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preferences.json");

    let config = SessionConfig {
        preferences_path: Some(path.clone()),
        ..SessionConfig::default()
    };
    let harness = SessionHarness::start_with(
        config,
        MockSignaling::new(),
        MockMediaEngine::new(),
        MockCapture::new(),
    );
    harness.handle.join("alice", ROOM, true, true).await.unwrap();

    let prefs = common::config::ClientPreferences::load(&path).unwrap();
    assert_eq!(prefs.display_name.as_deref(), Some("alice"));

    harness.shutdown().await;
}

// ============================================================================
// Local feed and streaming
// ============================================================================

#[tokio::test]
async fn test_enable_feed_is_idempotent() {
    let harness = SessionHarness::start();
    harness.handle.join("alice", ROOM, true, false).await.unwrap();

    harness.handle.enable_feed(true, false).await.unwrap();
    harness.handle.enable_feed(true, false).await.unwrap();

    let snapshot = harness.handle.snapshot();
    assert!(snapshot.is_stream_enabled);
    assert!(!snapshot.is_video_enabled);
    let tracks = harness.capture.user_tracks();
    assert_eq!(tracks.len(), 2, "devices acquired once");

    // Camera off: preview track disabled before any producer exists
    let camera = tracks.iter().find(|t| t.kind() == MediaKind::Video).unwrap();
    assert!(!camera.is_enabled());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_enable_feed_requires_join() {
    let harness = SessionHarness::start();

    let err = harness.handle.enable_feed(true, true).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_denied_devices_surface_acquisition_failure() {
    let harness = SessionHarness::start();
    harness.capture.deny_user_media();
    harness.handle.join("alice", ROOM, true, true).await.unwrap();

    let err = harness.handle.enable_feed(true, true).await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceAcquisitionFailure(_)));
    assert!(!harness.handle.snapshot().is_stream_enabled);
    assert!(harness.handle.snapshot().is_joined());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_send_feed_waits_for_remote_media_ready() {
    let harness = SessionHarness::start();
    harness.handle.join("alice", ROOM, true, true).await.unwrap();

    let err = harness.handle.send_feed().await.unwrap_err();
    assert!(matches!(err, SessionError::FeedNotEnabled));

    harness.handle.enable_feed(true, true).await.unwrap();
    let err = harness.handle.send_feed().await.unwrap_err();
    assert!(matches!(err, SessionError::RemoteMediaNotReady));
    assert_eq!(harness.signaling.count(events::REQUEST_TRANSPORT), 0);

    harness.push(PushEvent::RemoteMediaReady).await;
    harness.wait_until(|s| s.remote_media_ready).await;
    harness.handle.send_feed().await.unwrap();
    assert!(harness.handle.snapshot().is_stream_sent);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_send_feed_opens_one_producer_per_kind() {
    let harness = SessionHarness::start();
    harness.join_and_stream("alice", ROOM).await;

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Joined { streaming: true });
    assert!(snapshot.is_stream_sent);
    assert_eq!(open_producers_of(&harness, MediaKind::Audio).len(), 1);
    assert_eq!(open_producers_of(&harness, MediaKind::Video).len(), 1);
    assert_eq!(harness.status().await.open_producers, 2);

    // Exactly one connect handshake for the send transport
    assert_eq!(harness.signaling.count(events::CONNECT_TRANSPORT), 1);
    let produced = harness.signaling.payloads(events::START_PRODUCING);
    assert!(produced
        .iter()
        .all(|p| p["appData"]["source"] == json!("device")));

    // Second call is a no-op
    harness.handle.send_feed().await.unwrap();
    assert_eq!(harness.signaling.count(events::START_PRODUCING), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_send_connect_failure_is_fatal_to_streaming() {
    let harness = SessionHarness::start();
    harness
        .signaling
        .respond_once(events::CONNECT_TRANSPORT, json!("error"));
    harness.handle.join("alice", ROOM, true, true).await.unwrap();
    harness.handle.enable_feed(true, true).await.unwrap();
    harness.push(PushEvent::RemoteMediaReady).await;
    harness.wait_until(|s| s.remote_media_ready).await;

    let err = harness.handle.send_feed().await.unwrap_err();
    assert!(matches!(err, SessionError::TransportConnectFailure { .. }));
    assert!(err.is_session_fatal());
    assert_eq!(harness.signaling.count(events::START_PRODUCING), 0);
    assert_eq!(harness.engine.open_transports(), 0);
    assert_eq!(
        harness.handle.snapshot().state,
        SessionState::Joined { streaming: false }
    );

    // User retries by hand
    harness.handle.send_feed().await.unwrap();
    assert!(harness.handle.snapshot().is_stream_sent);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_rejected_producer_only_affects_its_kind() {
    let harness = SessionHarness::start();
    // Audio is produced first
    harness
        .signaling
        .respond_once(events::START_PRODUCING, json!("error"));

    harness.join_and_stream("alice", ROOM).await;

    assert!(open_producers_of(&harness, MediaKind::Audio).is_empty());
    assert_eq!(open_producers_of(&harness, MediaKind::Video).len(), 1);
    assert!(harness.handle.snapshot().is_stream_sent);

    harness.shutdown().await;
}

// ============================================================================
// Toggles
// ============================================================================

#[tokio::test]
async fn test_toggle_video_round_trip() {
    let harness = SessionHarness::start();
    harness.join_and_stream("alice", ROOM).await;

    let video = open_producers_of(&harness, MediaKind::Video).pop().unwrap();
    let camera = harness
        .capture
        .user_tracks()
        .into_iter()
        .find(|t| t.kind() == MediaKind::Video)
        .unwrap();
    assert!(!video.is_paused());
    assert!(camera.is_enabled());

    assert!(!harness.handle.toggle_video().await.unwrap());
    assert!(video.is_paused());
    assert!(!camera.is_enabled());

    assert!(harness.handle.toggle_video().await.unwrap());
    assert!(!video.is_paused());
    assert!(camera.is_enabled());

    assert_eq!(
        harness.signaling.payloads(events::TOGGLE_VIDEO),
        vec![json!({ "paused": true }), json!({ "paused": false })]
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_mute_flips_audio_and_notifies() {
    let harness = SessionHarness::start();
    harness.join_and_stream("alice", ROOM).await;

    assert!(harness.handle.mute_audio().await.unwrap());
    assert!(harness.handle.snapshot().is_muted);
    let mic = harness
        .capture
        .user_tracks()
        .into_iter()
        .find(|t| t.kind() == MediaKind::Audio)
        .unwrap();
    assert!(!mic.is_enabled());
    assert_eq!(
        harness.signaling.payloads(events::TOGGLE_AUDIO),
        vec![json!({ "paused": true })]
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_mute_before_join_is_local_only() {
    let harness = SessionHarness::start();

    assert!(harness.handle.mute_audio().await.unwrap());
    // Video starts disabled until a join says otherwise
    assert!(harness.handle.toggle_video().await.unwrap());
    assert_eq!(harness.signaling.count(events::TOGGLE_AUDIO), 0);
    assert_eq!(harness.signaling.count(events::TOGGLE_VIDEO), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_producer_pause_mirrors_join_flags() {
    let harness = SessionHarness::start();
    harness.handle.join("alice", ROOM, false, true).await.unwrap();
    harness.handle.enable_feed(false, true).await.unwrap();
    harness.push(PushEvent::RemoteMediaReady).await;
    harness.wait_until(|s| s.remote_media_ready).await;
    harness.handle.send_feed().await.unwrap();

    let audio = open_producers_of(&harness, MediaKind::Audio).pop().unwrap();
    assert!(audio.is_paused());

    harness.shutdown().await;
}

// ============================================================================
// Screen share
// ============================================================================

#[tokio::test]
async fn test_screen_share_requires_streaming() {
    let harness = SessionHarness::start();
    harness.handle.join("alice", ROOM, true, true).await.unwrap();

    let err = harness.handle.toggle_screen_share().await.unwrap_err();
    assert!(matches!(err, SessionError::NotStreaming));
    assert!(harness.capture.display_tracks().is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_screen_share_toggle_on_and_off() {
    let capture = MockCapture::new().with_display_audio(true);
    let harness = SessionHarness::start_with(
        SessionConfig::default(),
        MockSignaling::new(),
        MockMediaEngine::new(),
        capture,
    );
    harness.join_and_stream("alice", ROOM).await;

    assert!(harness.handle.toggle_screen_share().await.unwrap());
    assert!(harness.handle.snapshot().is_screen_sharing);
    assert_eq!(harness.engine.open_producers(), 4);

    let produced = harness.signaling.payloads(events::START_PRODUCING);
    let screen: Vec<_> = produced
        .iter()
        .filter(|p| p["appData"]["source"] == json!("screen"))
        .collect();
    assert_eq!(screen.len(), 2);
    assert_eq!(harness.signaling.count(events::START_SCREEN_SHARE), 1);

    assert!(!harness.handle.toggle_screen_share().await.unwrap());
    assert!(!harness.handle.snapshot().is_screen_sharing);
    assert_eq!(harness.engine.open_producers(), 2);
    assert_eq!(harness.signaling.count(events::STOP_SCREEN_SHARE), 1);
    assert!(harness.capture.display_tracks().iter().all(|t| t.is_ended()));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_os_stop_sharing_runs_toggle_off_path() {
    let harness = SessionHarness::start();
    harness.join_and_stream("alice", ROOM).await;

    assert!(harness.handle.toggle_screen_share().await.unwrap());
    assert_eq!(harness.engine.open_producers(), 3);

    harness.capture.end_display();
    harness.wait_until(|s| !s.is_screen_sharing).await;
    harness.signaling.wait_for(events::STOP_SCREEN_SHARE, 1).await;

    assert_eq!(harness.engine.open_producers(), 2);
    assert_eq!(harness.signaling.count(events::STOP_SCREEN_SHARE), 1);

    // Sharing again works after an OS-level stop
    assert!(harness.handle.toggle_screen_share().await.unwrap());
    assert_eq!(harness.engine.open_producers(), 3);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_dismissed_picker_keeps_existing_producers() {
    let harness = SessionHarness::start();
    harness.join_and_stream("alice", ROOM).await;
    harness.capture.deny_display();

    let err = harness.handle.toggle_screen_share().await.unwrap_err();
    assert!(matches!(err, SessionError::DeviceAcquisitionFailure(_)));
    assert!(!harness.handle.snapshot().is_screen_sharing);
    assert_eq!(harness.engine.open_producers(), 2);

    harness.shutdown().await;
}

// ============================================================================
// Ending the session
// ============================================================================

#[tokio::test]
async fn test_hang_up_is_idempotent_and_releases_everything() {
    let harness = SessionHarness::start();
    harness.join_and_stream("alice", ROOM).await;
    assert!(harness.handle.toggle_screen_share().await.unwrap());

    harness.handle.hang_up().await.unwrap();

    assert_eq!(harness.handle.snapshot().state, SessionState::Ended);
    assert_eq!(harness.engine.open_producers(), 0);
    assert_eq!(harness.engine.open_consumers(), 0);
    assert_eq!(harness.engine.open_transports(), 0);
    assert_eq!(harness.capture.live_tracks(), 0);
    assert_eq!(harness.handle.slots().bound_count(), 0);

    // Screen share stops before leaving
    let sent = harness.signaling.events();
    let stop = sent.iter().position(|e| e == events::STOP_SCREEN_SHARE).unwrap();
    let leave = sent.iter().position(|e| e == events::LEAVE_ROOM).unwrap();
    assert!(stop < leave);

    harness.handle.hang_up().await.unwrap();
    assert_eq!(harness.signaling.count(events::LEAVE_ROOM), 1);

    let err = harness.handle.get_state().await.unwrap_err();
    assert!(matches!(err, SessionError::SessionEnded));
}

#[tokio::test]
async fn test_hang_up_before_join_is_a_no_op() {
    let harness = SessionHarness::start();

    harness.handle.hang_up().await.unwrap();

    assert_eq!(harness.handle.snapshot().state, SessionState::Idle);
    assert_eq!(harness.signaling.count(events::LEAVE_ROOM), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_end_call_is_owner_only() {
    let harness = SessionHarness::start();
    harness.handle.join("alice", ROOM, true, true).await.unwrap();

    let err = harness.handle.end_call().await.unwrap_err();
    assert!(matches!(err, SessionError::PermissionDenied(_)));
    assert!(harness.handle.snapshot().is_joined());
    assert_eq!(harness.signaling.count(events::END_CALL), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_owner_ends_call_for_everyone() {
    let harness = SessionHarness::start_with(
        SessionConfig::default(),
        MockSignaling::new().with_owner(true),
        MockMediaEngine::new(),
        MockCapture::new(),
    );
    harness.join_and_stream("alice", ROOM).await;
    assert!(harness.handle.snapshot().is_owner);

    harness.handle.end_call().await.unwrap();

    assert_eq!(harness.handle.snapshot().state, SessionState::Ended);
    assert_eq!(harness.signaling.count(events::END_CALL), 1);
    assert_eq!(harness.signaling.count(events::LEAVE_ROOM), 0);
    assert_eq!(harness.engine.open_transports(), 0);
}

#[tokio::test]
async fn test_call_ended_by_owner_tears_down_quietly() {
    let mut harness = SessionHarness::start();
    harness.join_and_stream("bob", ROOM).await;

    harness.push(PushEvent::CallEnded).await;
    harness.join_task().await;

    assert_eq!(harness.handle.snapshot().state, SessionState::Ended);
    assert_eq!(harness.signaling.count(events::LEAVE_ROOM), 0);
    assert_eq!(harness.engine.open_producers(), 0);
    assert_eq!(harness.engine.open_transports(), 0);
    assert_eq!(harness.capture.live_tracks(), 0);
}

#[tokio::test]
async fn test_reconnect_give_up_ends_session() {
    let mut harness = SessionHarness::start();
    harness.join_and_stream("alice", ROOM).await;
    harness.push(PushEvent::Connected).await;
    harness.wait_until(|s| s.signaling_connected).await;

    harness
        .push(PushEvent::Disconnected {
            reason: "transport close".to_string(),
        })
        .await;
    harness.wait_until(|s| !s.signaling_connected).await;
    assert!(harness.handle.snapshot().is_joined());

    harness.push(PushEvent::ReconnectFailed).await;
    harness.join_task().await;

    assert_eq!(harness.handle.snapshot().state, SessionState::Ended);
    assert_eq!(harness.engine.open_transports(), 0);
}

#[tokio::test]
async fn test_connect_event_marks_signaling_connected() {
    let harness = SessionHarness::start();

    harness.push(PushEvent::Connected).await;
    harness.wait_until(|s| s.signaling_connected).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_cancellation_leaves_room() {
    let harness = SessionHarness::start();
    harness.join_and_stream("alice", ROOM).await;
    let signaling = harness.signaling.clone();
    let engine = harness.engine.clone();

    harness.shutdown().await;

    assert_eq!(signaling.count(events::LEAVE_ROOM), 1);
    assert_eq!(engine.open_producers(), 0);
    assert_eq!(engine.open_transports(), 0);
}

/// Join, enable the feed and mark remote media ready, without streaming.
async fn ready_to_stream(harness: &SessionHarness) {
    harness.handle.join("alice", ROOM, true, true).await.unwrap();
    harness.handle.enable_feed(true, true).await.unwrap();
    harness.push(PushEvent::RemoteMediaReady).await;
    harness.wait_until(|s| s.remote_media_ready).await;
}

#[tokio::test]
async fn test_hang_up_does_not_wait_for_in_flight_send_feed() {
    let harness = SessionHarness::start();
    ready_to_stream(&harness).await;
    harness.signaling.hold(events::START_PRODUCING);

    let handle = harness.handle.clone();
    let send = tokio::spawn(async move { handle.send_feed().await });
    harness.signaling.wait_for(events::START_PRODUCING, 1).await;

    tokio::time::timeout(Duration::from_secs(2), harness.handle.hang_up())
        .await
        .expect("hang-up blocked behind startProducing")
        .unwrap();
    assert_eq!(harness.handle.snapshot().state, SessionState::Ended);
    assert!(!harness.handle.snapshot().is_stream_sent);
    assert!(matches!(
        send.await.unwrap(),
        Err(SessionError::SessionEnded)
    ));
    assert_eq!(harness.signaling.count(events::LEAVE_ROOM), 1);

    // Producers that open once the ack lands are closed, never registered
    harness.signaling.release(events::START_PRODUCING);
    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.engine.producers().len() < 2 || harness.engine.open_producers() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("late producers were not closed");
    assert_eq!(harness.engine.open_transports(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_cancel_during_send_feed_ends_session() {
    let mut harness = SessionHarness::start();
    ready_to_stream(&harness).await;
    harness.signaling.hold(events::START_PRODUCING);

    let handle = harness.handle.clone();
    let send = tokio::spawn(async move { handle.send_feed().await });
    harness.signaling.wait_for(events::START_PRODUCING, 1).await;

    harness.handle.cancel();
    harness.join_task().await;

    assert_eq!(harness.handle.snapshot().state, SessionState::Ended);
    assert!(send.await.unwrap().is_err());
    assert_eq!(harness.signaling.count(events::LEAVE_ROOM), 1);
    // Hang-up after the session ended is still a no-op
    harness.handle.hang_up().await.unwrap();
}

#[tokio::test]
async fn test_cancel_during_join_leaves_once_the_ack_arrives() {
    let mut harness = SessionHarness::start();
    harness.signaling.hold(events::JOIN);

    let handle = harness.handle.clone();
    let join = tokio::spawn(async move { handle.join("alice", ROOM, true, true).await });
    harness.signaling.wait_for(events::JOIN, 1).await;
    assert!(harness.handle.snapshot().is_joining());

    harness.handle.cancel();
    harness.join_task().await;

    assert_eq!(harness.handle.snapshot().state, SessionState::Ended);
    assert!(matches!(
        join.await.unwrap(),
        Err(SessionError::SessionEnded)
    ));
    assert_eq!(harness.signaling.count(events::LEAVE_ROOM), 0);

    // The server admits us after all; the session tells it we left
    harness.signaling.release(events::JOIN);
    harness.signaling.wait_for(events::LEAVE_ROOM, 1).await;
}

#[tokio::test]
async fn test_commands_during_send_feed_apply_after_it_lands() {
    let harness = SessionHarness::start();
    ready_to_stream(&harness).await;
    harness.signaling.hold(events::START_PRODUCING);

    let handle = harness.handle.clone();
    let send = tokio::spawn(async move { handle.send_feed().await });
    harness.signaling.wait_for(events::START_PRODUCING, 1).await;

    let handle = harness.handle.clone();
    let mute = tokio::spawn(async move { handle.mute_audio().await });
    harness.signaling.release(events::START_PRODUCING);

    send.await.unwrap().unwrap();
    assert!(mute.await.unwrap().unwrap());

    let audio = open_producers_of(&harness, MediaKind::Audio);
    assert_eq!(audio.len(), 1);
    assert!(audio.first().unwrap().is_paused());
    assert_eq!(harness.signaling.count(events::TOGGLE_AUDIO), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_actions_after_end_report_session_ended() {
    let mut harness = SessionHarness::start();
    harness.handle.join("alice", ROOM, true, true).await.unwrap();
    harness.push(PushEvent::CallEnded).await;
    harness.join_task().await;

    let err = harness.handle.send_feed().await.unwrap_err();
    assert!(matches!(err, SessionError::SessionEnded));
    let err = harness.handle.mute_audio().await.unwrap_err();
    assert!(matches!(err, SessionError::SessionEnded));

    // The slot table and state stay readable
    assert_eq!(harness.handle.slots().bound_count(), 0);
    assert!(!harness.handle.snapshot().is_joining());
}
