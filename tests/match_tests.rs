use std::sync::Arc;
use std::time::Duration;

use battleship_server::{
    spawn_match, AuditEvent, FleetManifest, InMemoryTransport, MatchReport, MemoryAuditLog,
    ServerConfig, SessionPool, ShipDef, ShotOutcome, Termination, Transport,
};
use tokio::task::JoinHandle;

struct Harness {
    a: InMemoryTransport,
    b: InMemoryTransport,
    pool: Arc<SessionPool>,
    audit: Arc<MemoryAuditLog>,
    handle: JoinHandle<MatchReport>,
}

fn small_config() -> ServerConfig {
    ServerConfig::default()
        .with_turn_timeout(Duration::from_secs(30))
        .with_placement_timeout(Duration::from_secs(30))
        .with_audit_log(None)
        .with_fleet(FleetManifest::new(vec![
            ShipDef::new("Cruiser", 3),
            ShipDef::new("Submarine", 1),
        ]))
}

fn start(config: ServerConfig) -> Harness {
    let pool = Arc::new(SessionPool::new(1));
    let audit = Arc::new(MemoryAuditLog::new());
    let (server_a, a) = InMemoryTransport::pair();
    let (server_b, b) = InMemoryTransport::pair();
    let handle = spawn_match(
        &pool,
        Box::new(server_a),
        Box::new(server_b),
        Arc::new(config),
        audit.clone(),
    )
    .unwrap();
    Harness {
        a,
        b,
        pool,
        audit,
        handle,
    }
}

async fn expect(t: &mut InMemoryTransport, want: &str) {
    let got = t.recv().await.unwrap();
    assert_eq!(got.as_deref(), Some(want));
}

async fn send(t: &mut InMemoryTransport, frame: &str) {
    t.send(frame).await.unwrap();
}

/// Everything left until the server closes the connection.
async fn drain(t: &mut InMemoryTransport) -> Vec<String> {
    let mut frames = Vec::new();
    while let Some(frame) = t.recv().await.unwrap() {
        frames.push(frame);
    }
    frames
}

async fn login(h: &mut Harness) {
    send(&mut h.a, "LOGIN|alice").await;
    send(&mut h.b, "LOGIN|bob").await;
    expect(&mut h.a, "LOGIN|OK").await;
    expect(&mut h.b, "LOGIN|OK").await;
}

/// alice: cruiser (0,0)-(0,2), submarine (5,5).
/// bob: cruiser (0,0)-(0,2), submarine (9,9).
async fn login_and_place(h: &mut Harness) {
    login(h).await;
    expect(&mut h.a, "PLACE_SHIP|Cruiser|3").await;
    send(&mut h.a, "SHIP_POS|0,0,H").await;
    expect(&mut h.a, "PLACE_SHIP|Submarine|1").await;
    send(&mut h.a, "SHIP_POS|5,5,V").await;

    expect(&mut h.b, "PLACE_SHIP|Cruiser|3").await;
    send(&mut h.b, "SHIP_POS|0,0,H").await;
    expect(&mut h.b, "PLACE_SHIP|Submarine|1").await;
    send(&mut h.b, "SHIP_POS|9,9,H").await;

    expect(&mut h.a, "YOUR_TURN|30").await;
    expect(&mut h.b, "WAIT_TURN|alice").await;
}

#[tokio::test(start_paused = true)]
async fn test_first_shooter_sinks_fleet() {
    let mut h = start(small_config());
    login_and_place(&mut h).await;

    for (shot, result, notice) in [
        ("0,0", "RESULT|HIT", "ENEMY_HIT|0,0"),
        ("0,1", "RESULT|HIT", "ENEMY_HIT|0,1"),
        ("0,2", "RESULT|SUNK", "ENEMY_SUNK|0,2"),
    ] {
        send(&mut h.a, shot).await;
        expect(&mut h.a, result).await;
        expect(&mut h.b, notice).await;
        // a hit keeps the turn with a fresh deadline
        expect(&mut h.a, "YOUR_TURN|30").await;
        expect(&mut h.b, "WAIT_TURN|alice").await;
    }
    send(&mut h.a, "9,9").await;
    expect(&mut h.a, "RESULT|SUNK").await;
    expect(&mut h.b, "ENEMY_SUNK|9,9").await;

    assert_eq!(drain(&mut h.a).await, ["GAME_OVER|YOU_WIN"]);
    assert_eq!(drain(&mut h.b).await, ["GAME_OVER|YOU_LOSE"]);

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::FleetDestroyed { winner: 0 });
    assert_eq!(report.winner.as_deref(), Some("alice"));
    assert_eq!(report.shots_fired, 4);
    assert_eq!(h.pool.active_count(), 0);

    let events = h.audit.events();
    assert_eq!(events.len(), 8);
    assert!(matches!(
        &events[0],
        AuditEvent::MatchStarted { players, .. } if players == &["alice".to_string(), "bob".to_string()]
    ));
    assert!(matches!(&events[1], AuditEvent::FleetPlaced { player, .. } if player == "alice"));
    assert!(matches!(
        &events[6],
        AuditEvent::ShotFired { row: 9, col: 9, outcome: ShotOutcome::Sunk, .. }
    ));
    assert!(matches!(
        &events[7],
        AuditEvent::MatchEnded { winner: Some(w), reason: "FLEET_DESTROYED", .. } if w == "alice"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_miss_passes_turn_and_errors_keep_it() {
    let mut h = start(small_config());
    login_and_place(&mut h).await;

    send(&mut h.a, "4,4").await;
    expect(&mut h.a, "RESULT|MISS").await;
    expect(&mut h.b, "ENEMY_MISS|4,4").await;
    expect(&mut h.b, "YOUR_TURN|30").await;
    expect(&mut h.a, "WAIT_TURN|bob").await;

    send(&mut h.b, "5,5").await;
    expect(&mut h.b, "RESULT|SUNK").await;
    expect(&mut h.a, "ENEMY_SUNK|5,5").await;
    expect(&mut h.b, "YOUR_TURN|30").await;
    expect(&mut h.a, "WAIT_TURN|bob").await;

    send(&mut h.b, "5,5").await;
    expect(&mut h.b, "ERROR|YA_DISPARASTE_AQUI").await;
    expect(&mut h.b, "YOUR_TURN|30").await;

    send(&mut h.b, "10,0").await;
    expect(&mut h.b, "ERROR|POSICION_INVALIDA").await;
    expect(&mut h.b, "YOUR_TURN|30").await;

    send(&mut h.b, "x,y").await;
    expect(&mut h.b, "ERROR|POSICION_INVALIDA").await;
    expect(&mut h.b, "YOUR_TURN|30").await;

    send(&mut h.b, "LOGIN|again").await;
    expect(&mut h.b, "ERROR|UNEXPECTED_MESSAGE").await;
    expect(&mut h.b, "YOUR_TURN|30").await;

    send(&mut h.a, "1,1").await;
    expect(&mut h.a, "ERROR|NOT_YOUR_TURN").await;

    send(&mut h.b, "QUIT|").await;
    assert_eq!(drain(&mut h.b).await, ["GAME_OVER|YOU_QUIT"]);
    assert_eq!(drain(&mut h.a).await, ["GAME_OVER|OPPONENT_QUIT"]);

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::Quit { seat: 1 });
    assert_eq!(report.winner.as_deref(), Some("alice"));
    assert_eq!(report.shots_fired, 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_shot_keeps_running_deadline() {
    let mut h = start(small_config());
    login_and_place(&mut h).await;

    tokio::time::advance(Duration::from_secs(10)).await;
    send(&mut h.a, "42").await;
    expect(&mut h.a, "ERROR|POSICION_INVALIDA").await;
    expect(&mut h.a, "YOUR_TURN|20").await;

    send(&mut h.a, "3,3").await;
    expect(&mut h.a, "RESULT|MISS").await;
    expect(&mut h.b, "ENEMY_MISS|3,3").await;
    expect(&mut h.b, "YOUR_TURN|30").await;

    send(&mut h.b, "QUIT|").await;
    h.handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_turn_timeout_passes_turn() {
    let mut h = start(small_config());
    login_and_place(&mut h).await;

    expect(&mut h.a, "TURN_END|TIME_OUT").await;
    expect(&mut h.b, "YOUR_TURN|30").await;
    expect(&mut h.a, "WAIT_TURN|bob").await;

    send(&mut h.b, "9,0").await;
    expect(&mut h.b, "RESULT|MISS").await;
    expect(&mut h.a, "ENEMY_MISS|9,0").await;
    expect(&mut h.a, "YOUR_TURN|30").await;

    send(&mut h.a, "QUIT|").await;
    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::Quit { seat: 0 });
    assert!(h
        .audit
        .events()
        .iter()
        .any(|e| matches!(e, AuditEvent::TurnTimedOut { player, .. } if player == "alice")));
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_timeouts_forfeit() {
    let mut h = start(small_config().with_max_consecutive_timeouts(Some(2)));
    login_and_place(&mut h).await;

    let a_frames = drain(&mut h.a).await;
    let b_frames = drain(&mut h.b).await;
    assert_eq!(
        a_frames.iter().filter(|f| *f == "TURN_END|TIME_OUT").count(),
        2
    );
    assert_eq!(a_frames.last().map(String::as_str), Some("GAME_OVER|YOU_LOSE"));
    assert_eq!(
        b_frames.last().map(String::as_str),
        Some("GAME_OVER|OPPONENT_TIMEOUT")
    );

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::TurnTimeouts { seat: 0 });
    assert_eq!(report.winner.as_deref(), Some("bob"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_on_own_turn_forfeits() {
    let mut h = start(small_config());
    login_and_place(&mut h).await;

    drop(h.a);
    assert_eq!(drain(&mut h.b).await, ["GAME_OVER|OPPONENT_DISCONNECTED"]);

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::Disconnected { seat: 0 });
    assert_eq!(report.winner.as_deref(), Some("bob"));
    assert_eq!(h.pool.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_participant_disconnects_mid_game() {
    let mut h = start(small_config());
    login_and_place(&mut h).await;

    drop(h.b);
    assert_eq!(drain(&mut h.a).await, ["GAME_OVER|OPPONENT_DISCONNECTED"]);

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::Disconnected { seat: 1 });
    assert_eq!(report.winner.as_deref(), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_before_any_fleet_placed_aborts() {
    let mut h = start(small_config());
    login(&mut h).await;
    expect(&mut h.a, "PLACE_SHIP|Cruiser|3").await;

    drop(h.b);
    assert_eq!(drain(&mut h.a).await, ["GAME_OVER|OPPONENT_DISCONNECTED"]);

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::Disconnected { seat: 1 });
    assert_eq!(report.winner, None);
    assert!(matches!(
        h.audit.events().last(),
        Some(AuditEvent::MatchEnded { winner: None, reason: "DISCONNECTED", .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_own_placement_forfeits() {
    let mut h = start(small_config());
    login(&mut h).await;
    expect(&mut h.a, "PLACE_SHIP|Cruiser|3").await;
    send(&mut h.a, "SHIP_POS|0,0,H").await;
    expect(&mut h.a, "PLACE_SHIP|Submarine|1").await;
    send(&mut h.a, "SHIP_POS|5,5,V").await;
    expect(&mut h.b, "PLACE_SHIP|Cruiser|3").await;
    send(&mut h.b, "SHIP_POS|0,0,H").await;
    expect(&mut h.b, "PLACE_SHIP|Submarine|1").await;

    drop(h.b);
    assert_eq!(drain(&mut h.a).await, ["GAME_OVER|OPPONENT_DISCONNECTED"]);

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::Disconnected { seat: 1 });
    assert_eq!(report.winner.as_deref(), Some("alice"));
    assert_eq!(h.pool.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_placement_after_opponent_placed() {
    let mut h = start(small_config());
    login(&mut h).await;
    expect(&mut h.a, "PLACE_SHIP|Cruiser|3").await;
    send(&mut h.a, "SHIP_POS|0,0,H").await;
    expect(&mut h.a, "PLACE_SHIP|Submarine|1").await;
    send(&mut h.a, "SHIP_POS|5,5,V").await;

    expect(&mut h.b, "PLACE_SHIP|Cruiser|3").await;
    send(&mut h.b, "SHIP_POS|0,8,H").await;
    assert_eq!(
        drain(&mut h.b).await,
        ["ERROR|INVALID_SHIP_POSITION", "GAME_OVER|YOU_LOSE"]
    );
    assert_eq!(drain(&mut h.a).await, ["GAME_OVER|YOU_WIN"]);

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::InvalidPlacement { seat: 1 });
    assert_eq!(report.winner.as_deref(), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_placement_before_opponent_placed_aborts() {
    let mut h = start(small_config());
    login(&mut h).await;
    expect(&mut h.a, "PLACE_SHIP|Cruiser|3").await;
    send(&mut h.a, "SHIP_POS|8,0,V").await;

    assert_eq!(
        drain(&mut h.a).await,
        ["ERROR|INVALID_SHIP_POSITION", "GAME_OVER|MATCH_ABORTED"]
    );
    assert_eq!(drain(&mut h.b).await, ["GAME_OVER|MATCH_ABORTED"]);

    let report = h.handle.await.unwrap();
    assert_eq!(report.winner, None);
    assert!(matches!(
        h.audit.events().last(),
        Some(AuditEvent::MatchEnded { winner: None, reason: "INVALID_PLACEMENT", .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_placement_timeout() {
    let mut h = start(small_config());
    login(&mut h).await;
    expect(&mut h.a, "PLACE_SHIP|Cruiser|3").await;

    assert_eq!(drain(&mut h.a).await, ["GAME_OVER|MATCH_ABORTED"]);
    assert_eq!(drain(&mut h.b).await, ["GAME_OVER|OPPONENT_TIMEOUT"]);
    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::PlacementTimeout { seat: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_waiting_participant_can_quit_during_placement() {
    let mut h = start(small_config());
    login(&mut h).await;
    expect(&mut h.a, "PLACE_SHIP|Cruiser|3").await;

    send(&mut h.b, "SHIP_POS|0,0,H").await;
    expect(&mut h.b, "ERROR|NOT_YOUR_TURN").await;
    send(&mut h.b, "QUIT|").await;

    assert_eq!(drain(&mut h.b).await, ["GAME_OVER|YOU_QUIT"]);
    assert_eq!(drain(&mut h.a).await, ["GAME_OVER|OPPONENT_QUIT"]);
    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::Quit { seat: 1 });
    assert_eq!(report.winner, None);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_login_aborts_without_audit() {
    let mut h = start(small_config());
    send(&mut h.a, "LOGIN|").await;
    send(&mut h.b, "LOGIN|bob").await;

    assert_eq!(drain(&mut h.a).await, ["ERROR|INVALID_LOGIN"]);
    let b_frames = drain(&mut h.b).await;
    assert_eq!(
        b_frames.last().map(String::as_str),
        Some("GAME_OVER|MATCH_ABORTED")
    );

    let report = h.handle.await.unwrap();
    assert_eq!(report.termination, Termination::LoginFailed { seat: 0 });
    assert!(h.audit.events().is_empty());
    assert_eq!(h.pool.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pool_exhaustion_returns_transports() {
    let pool = Arc::new(SessionPool::new(1));
    let audit = Arc::new(MemoryAuditLog::new());
    let config = Arc::new(small_config());

    let (s1, c1) = InMemoryTransport::pair();
    let (s2, c2) = InMemoryTransport::pair();
    let first = spawn_match(
        &pool,
        Box::new(s1),
        Box::new(s2),
        config.clone(),
        audit.clone(),
    )
    .unwrap();

    let (s3, _c3) = InMemoryTransport::pair();
    let (s4, _c4) = InMemoryTransport::pair();
    let busy = spawn_match(&pool, Box::new(s3), Box::new(s4), config.clone(), audit.clone())
        .unwrap_err();
    let (s3, s4) = busy.into_transports();

    drop((c1, c2));
    first.await.unwrap();
    assert_eq!(pool.active_count(), 0);

    let second = spawn_match(&pool, s3, s4, config, audit).unwrap();
    assert_eq!(pool.active_count(), 1);
    second.abort();
}
