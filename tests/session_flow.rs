//! End-to-end session tests against a scripted fake transport
//!
//! Paused tokio time makes the idle watchdog deterministic: sleeping in a
//! test auto-advances the clock to the next pending deadline, firing the
//! session's timer before the test resumes.

use std::time::Duration;

use steprig::link::fake::FakeTransportFactory;
use steprig::link::{ChannelError, MotionToken};
use steprig::mapping::SpeedError;
use steprig::session::{InputEvent, SessionError, SessionHandle, SessionState};
use steprig::{KeyDirection, PointerSample, RigSettings};

fn spawn_session() -> (SessionHandle, FakeTransportFactory) {
    let factory = FakeTransportFactory::new();
    let session =
        SessionHandle::spawn_with_factory(RigSettings::default(), Box::new(factory.clone()));
    (session, factory)
}

/// Pointer sample displaced from the center of a 400x400 surface
fn sample(dx: f32, dy: f32) -> PointerSample {
    PointerSample::from_surface(200.0 + dx, 200.0 + dy, 400.0, 400.0)
}

async fn drain(session: &SessionHandle) {
    session.status().await.expect("session alive");
}

#[tokio::test(start_paused = true)]
async fn pointer_left_of_center_transmits_left_once() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    // 400x400 surface, pointer at (150, 200): dx = -50, dy = 0.
    let left = PointerSample::from_surface(150.0, 200.0, 400.0, 400.0);
    session.input(InputEvent::PointerMoved(left)).await.unwrap();
    session.input(InputEvent::PointerMoved(left)).await.unwrap();
    drain(&session).await;

    assert_eq!(factory.transport().frames(), vec!["L\n"]);

    let status = session.status().await.unwrap();
    assert_eq!(status.connection_state, SessionState::Connected);
    assert_eq!(status.port.as_deref(), Some("COM7"));
    assert_eq!(status.last_token, Some(MotionToken::Left));
    assert_eq!(status.commands_sent, 1);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_forces_exactly_one_stop() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    session
        .input(InputEvent::PointerMoved(sample(60.0, 0.0)))
        .await
        .unwrap();
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["R\n"]);

    // No further input: the 200ms watchdog fires once and only once.
    tokio::time::sleep(Duration::from_millis(250)).await;
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["R\n", "X\n"]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["R\n", "X\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn renewing_input_rearms_the_watchdog() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    session
        .input(InputEvent::PointerMoved(sample(60.0, 0.0)))
        .await
        .unwrap();
    drain(&session).await;

    // Renew 150ms in: the send is de-duplicated but the deadline moves.
    tokio::time::sleep(Duration::from_millis(150)).await;
    session
        .input(InputEvent::PointerMoved(sample(65.0, 0.0)))
        .await
        .unwrap();
    drain(&session).await;

    // 300ms after the first sample, past the original deadline but not
    // the renewed one: no stop yet.
    tokio::time::sleep(Duration::from_millis(150)).await;
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["R\n"]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["R\n", "X\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pointer_leave_stops_immediately_and_disarms_the_watchdog() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    session
        .input(InputEvent::PointerMoved(sample(60.0, 0.0)))
        .await
        .unwrap();
    session.input(InputEvent::PointerLeft).await.unwrap();
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["R\n", "X\n"]);

    // The cancelled watchdog must not produce a second stop later.
    tokio::time::sleep(Duration::from_millis(500)).await;
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["R\n", "X\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dead_zone_sample_stops_and_cancels_pending_timeout() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    session
        .input(InputEvent::PointerMoved(sample(0.0, -60.0)))
        .await
        .unwrap();
    session
        .input(InputEvent::PointerMoved(sample(5.0, 5.0)))
        .await
        .unwrap();
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["U\n", "X\n"]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["U\n", "X\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_sends_safety_stop_before_closing() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    session
        .input(InputEvent::PointerMoved(sample(60.0, 0.0)))
        .await
        .unwrap();
    session.disconnect().await.unwrap();

    assert_eq!(factory.transport().frames(), vec!["R\n", "X\n"]);
    let status = session.status().await.unwrap();
    assert_eq!(status.connection_state, SessionState::Disconnected);
    assert_eq!(status.port, None);

    // Disconnecting again is an idempotent no-op.
    session.disconnect().await.unwrap();
    assert_eq!(factory.transport().frames(), vec!["R\n", "X\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_performs_a_best_effort_disconnect() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();
    session
        .input(InputEvent::PointerMoved(sample(0.0, 60.0)))
        .await
        .unwrap();
    drain(&session).await;

    session.shutdown().await;
    assert_eq!(factory.transport().frames(), vec!["D\n", "X\n"]);
}

#[tokio::test(start_paused = true)]
async fn key_release_stops_all_motion_while_another_key_is_held() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    session
        .input(InputEvent::KeyPressed(KeyDirection::Up))
        .await
        .unwrap();
    session
        .input(InputEvent::KeyPressed(KeyDirection::Right))
        .await
        .unwrap();
    // Releasing the secondary key halts all motion even though Up is
    // still held: preserved controller quirk.
    session
        .input(InputEvent::KeyReleased(KeyDirection::Right))
        .await
        .unwrap();
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["U\n", "R\n", "X\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn auto_repeat_presses_do_not_retransmit() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    for _ in 0..3 {
        session
            .input(InputEvent::KeyPressed(KeyDirection::Left))
            .await
            .unwrap();
    }
    session
        .input(InputEvent::KeyReleased(KeyDirection::Left))
        .await
        .unwrap();
    session
        .input(InputEvent::KeyReleased(KeyDirection::Left))
        .await
        .unwrap();
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["L\n", "X\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn speed_validation_rejects_without_transmitting() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    let err = session.set_speed("0").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Speed(SpeedError::NonPositive(0))
    ));

    let err = session.set_speed("abc").await.unwrap_err();
    assert!(matches!(err, SessionError::Speed(SpeedError::InvalidFormat(_))));

    assert!(factory.transport().frames().is_empty());

    let value = session.set_speed("120").await.unwrap();
    assert_eq!(value, 120);
    assert_eq!(factory.transport().frames(), vec!["S120\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn speed_requires_a_connected_session() {
    let (mut session, factory) = spawn_session();

    let err = session.set_speed("120").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
    assert!(factory.transport().frames().is_empty());

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn motion_input_is_ignored_while_disconnected() {
    let (mut session, factory) = spawn_session();

    session
        .input(InputEvent::PointerMoved(sample(60.0, 0.0)))
        .await
        .unwrap();
    session
        .input(InputEvent::KeyPressed(KeyDirection::Up))
        .await
        .unwrap();
    drain(&session).await;

    assert!(factory.transport().frames().is_empty());
    assert_eq!(factory.open_count(), 0);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_connect_leaves_the_session_disconnected() {
    let (mut session, factory) = spawn_session();
    factory.fail_opens(true);

    let err = session.connect("COM9").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Channel(ChannelError::OpenFailure { .. })
    ));
    let status = session.status().await.unwrap();
    assert_eq!(status.connection_state, SessionState::Disconnected);

    // The same endpoint connects fine once it is available again.
    factory.fail_opens(false);
    session.connect("COM9").await.unwrap();
    let status = session.status().await.unwrap();
    assert_eq!(status.connection_state, SessionState::Connected);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connecting_twice_is_rejected() {
    let (mut session, _factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    let err = session.connect("COM8").await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyConnected(port) if port == "COM7"));

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn write_failure_degrades_but_keeps_the_session_connected() {
    let (mut session, factory) = spawn_session();
    session.connect("COM7").await.unwrap();

    session
        .input(InputEvent::PointerMoved(sample(60.0, 0.0)))
        .await
        .unwrap();
    drain(&session).await;

    factory.transport().fail_next_write();
    session
        .input(InputEvent::PointerMoved(sample(0.0, 60.0)))
        .await
        .unwrap();
    drain(&session).await;

    let status = session.status().await.unwrap();
    assert_eq!(status.connection_state, SessionState::Connected);
    assert!(!status.error_messages.is_empty());
    // The failed token never became current, so the same classification
    // transmits on the next sample.
    session
        .input(InputEvent::PointerMoved(sample(0.0, 60.0)))
        .await
        .unwrap();
    drain(&session).await;
    assert_eq!(factory.transport().frames(), vec!["R\n", "D\n"]);

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_disconnect_starts_a_fresh_episode() {
    let (mut session, factory) = spawn_session();

    session.connect("COM7").await.unwrap();
    session
        .input(InputEvent::PointerMoved(sample(60.0, 0.0)))
        .await
        .unwrap();
    session.disconnect().await.unwrap();

    session.connect("COM7").await.unwrap();
    assert_eq!(factory.open_count(), 2);
    // Same direction as before the disconnect: transmitted again because
    // the current token was reset with the old link.
    session
        .input(InputEvent::PointerMoved(sample(60.0, 0.0)))
        .await
        .unwrap();
    drain(&session).await;
    assert_eq!(
        factory.transport().frames(),
        vec!["R\n", "X\n", "R\n"]
    );

    session.shutdown().await;
}
