//! Matchmaking and match flow through the hub, with in-process clients
//! standing in for sockets.

use std::sync::Arc;
use std::time::Duration;

use duelhub_protocol::{GameVariant, Outcome, ServerMessage, UserId, WaitingKey};
use duelhub_room::{
    ClientConfig, ClientHandle, ClientLink, Hub, HubConfig, MemoryStore, Outbound, RoomConfig,
    Stores,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time;

macro_rules! eventually {
    ($cond:expr) => {{
        let mut held = false;
        for _ in 0..200 {
            if $cond {
                held = true;
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(held, "condition never held: {}", stringify!($cond));
    }};
}

fn hub() -> (Hub, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let hub = Hub::new(
        HubConfig::default(),
        RoomConfig::default(),
        Stores::memory(store.clone()),
    );
    (hub, store)
}

fn quick_draw() -> WaitingKey {
    WaitingKey::new(GameVariant::QuickDraw, 100, "gems")
}

fn duel_board() -> WaitingKey {
    WaitingKey::new(GameVariant::DuelBoard, 50, "gems")
}

/// A client whose "write pump" just collects frames.
struct FakeClient {
    handle: ClientHandle,
    frames: mpsc::UnboundedReceiver<ServerMessage>,
}

impl FakeClient {
    fn connect(user: u64, key: &WaitingKey) -> Self {
        let (handle, link) = ClientHandle::new(UserId(user), key.clone(), &ClientConfig::default());
        let (tx, frames) = mpsc::unbounded_channel();
        tokio::spawn(pump(link, tx));
        Self { handle, frames }
    }

    async fn next(&mut self) -> ServerMessage {
        time::timeout(Duration::from_secs(60), self.frames.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("pump stopped")
    }

    /// Skips frames until one of `kind` arrives.
    async fn next_of(&mut self, kind: &str) -> ServerMessage {
        loop {
            let message = self.next().await;
            if message.kind() == kind {
                return message;
            }
        }
    }

    async fn send(&self, frame: Value) {
        self.handle
            .forward(serde_json::to_vec(&frame).unwrap(), Duration::from_secs(1))
            .await
            .unwrap();
    }
}

async fn pump(mut link: ClientLink, frames: mpsc::UnboundedSender<ServerMessage>) {
    let _ = link.ready.send(true);
    while let Some(outbound) = link.outbound.recv().await {
        match outbound {
            Outbound::Message(message) => {
                let _ = frames.send(message);
            }
            Outbound::Probe => {}
            Outbound::Final { message, delivered } => {
                let _ = frames.send(message);
                let _ = delivered.send(());
                break;
            }
        }
    }
}

fn result_of(message: ServerMessage) -> (Outcome, String) {
    match message {
        ServerMessage::Result(payload) => (payload.you, payload.reason),
        other => panic!("expected a result, got {other:?}"),
    }
}

async fn paired(hub: &Hub, key: &WaitingKey) -> (FakeClient, FakeClient) {
    let a = FakeClient::connect(1, key);
    let b = FakeClient::connect(2, key);
    hub.assign_client(a.handle.clone()).await.unwrap();
    hub.assign_client(b.handle.clone()).await.unwrap();
    (a, b)
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_two_clients_with_same_key_share_one_room() {
    let (hub, _) = hub();
    let (mut a, mut b) = paired(&hub, &quick_draw()).await;

    let room = hub.room_of(UserId(1)).await.unwrap();
    assert_eq!(hub.room_of(UserId(2)).await, Some(room));
    assert_eq!(hub.room_count().await, 1);
    assert_eq!(hub.waiting_count().await, 0);
    assert_eq!(hub.members(room).await, Some(vec![UserId(1), UserId(2)]));

    match a.next_of("matched").await {
        ServerMessage::Matched(m) => {
            assert_eq!(m.room_id, room);
            assert_eq!(m.opponent_id, UserId(2));
        }
        other => panic!("unexpected {other:?}"),
    }
    match b.next_of("matched").await {
        ServerMessage::Matched(m) => assert_eq!(m.opponent_id, UserId(1)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_client_gets_state_snapshot_on_registration() {
    let (hub, _) = hub();
    let mut a = FakeClient::connect(1, &quick_draw());
    hub.assign_client(a.handle.clone()).await.unwrap();
    match a.next().await {
        ServerMessage::State(state) => assert_eq!(state["game"], "quick-draw"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(hub.waiting_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_different_currency_never_pairs() {
    let (hub, _) = hub();
    let a = FakeClient::connect(1, &quick_draw());
    let b = FakeClient::connect(2, &WaitingKey::new(GameVariant::QuickDraw, 100, "coins"));
    hub.assign_client(a.handle.clone()).await.unwrap();
    hub.assign_client(b.handle.clone()).await.unwrap();

    assert_eq!(hub.room_count().await, 2);
    assert_eq!(hub.waiting_count().await, 2);
    assert_ne!(hub.room_of(UserId(1)).await, hub.room_of(UserId(2)).await);
}

#[tokio::test(start_paused = true)]
async fn test_same_user_is_never_paired_with_itself() {
    let (hub, _) = hub();
    let first = FakeClient::connect(1, &quick_draw());
    let second = FakeClient::connect(1, &quick_draw());

    let old_room = hub.assign_client(first.handle.clone()).await.unwrap();
    let new_room = hub.assign_client(second.handle.clone()).await.unwrap();

    assert_ne!(old_room, new_room);
    assert_eq!(hub.room_of(UserId(1)).await, Some(new_room));
    assert_eq!(hub.waiting_count().await, 1);
    eventually!(hub.room_count().await == 1);
    assert_eq!(hub.members(old_room).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_saturated_waiter_is_discarded_and_never_matched() {
    let (hub, _) = hub();
    let config = ClientConfig {
        outbound_capacity: 1,
        ..ClientConfig::default()
    };
    // nobody drains this queue
    let (stuck, _link) = ClientHandle::new(UserId(1), quick_draw(), &config);
    let stuck_room = hub.assign_client(stuck.clone()).await.unwrap();
    stuck.probe();

    let b = FakeClient::connect(2, &quick_draw());
    let b_room = hub.assign_client(b.handle.clone()).await.unwrap();

    assert_ne!(b_room, stuck_room);
    assert_eq!(hub.room_of(UserId(1)).await, None);
    assert_eq!(hub.members(b_room).await, Some(vec![UserId(2)]));
    assert_eq!(hub.waiting_count().await, 1);
    eventually!(hub.room_count().await == 1);
}

#[tokio::test(start_paused = true)]
async fn test_probe_sweep_purges_closed_waiter() {
    let (hub, _) = hub();
    let (gone, link) = ClientHandle::new(UserId(1), quick_draw(), &ClientConfig::default());
    hub.assign_client(gone.clone()).await.unwrap();
    drop(link);

    assert_eq!(hub.probe_waiters().await, 1);
    assert_eq!(hub.waiting_count().await, 0);
    assert_eq!(hub.room_of(UserId(1)).await, None);
    eventually!(hub.room_count().await == 0);

    // a live newcomer starts fresh rather than pairing with the dead one
    let b = FakeClient::connect(2, &quick_draw());
    hub.assign_client(b.handle.clone()).await.unwrap();
    assert_eq!(hub.waiting_count().await, 1);
    assert_eq!(hub.probe_waiters().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reaper_keeps_occupied_rooms() {
    let (hub, _) = hub();
    let a = FakeClient::connect(1, &quick_draw());
    hub.assign_client(a.handle.clone()).await.unwrap();
    time::sleep(Duration::from_secs(120)).await;
    assert_eq!(hub.reap_empty_rooms().await, 0);
    assert_eq!(hub.room_count().await, 1);
}

// ---------------------------------------------------------------------------
// Disconnects
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_disconnect_awards_forfeit_and_removes_room() {
    let (hub, store) = hub();
    let (mut a, mut b) = paired(&hub, &quick_draw()).await;
    a.next_of("start").await;
    b.next_of("start").await;

    hub.on_disconnect(&b.handle).await;

    let (you, reason) = result_of(a.next_of("result").await);
    assert_eq!(you, Outcome::Win);
    assert_eq!(reason, "opponent_disconnected");

    eventually!(hub.room_count().await == 0);
    assert_eq!(hub.room_of(UserId(1)).await, None);
    assert_eq!(hub.room_of(UserId(2)).await, None);

    eventually!(store.history().await.len() == 2);
    assert_eq!(store.history_for(UserId(1)).await[0].result, Outcome::Win);
    assert_eq!(store.history_for(UserId(2)).await[0].result, Outcome::Lose);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_disconnect_empties_room() {
    let (hub, store) = hub();
    let a = FakeClient::connect(1, &quick_draw());
    hub.assign_client(a.handle.clone()).await.unwrap();

    hub.on_disconnect(&a.handle).await;

    assert_eq!(hub.waiting_count().await, 0);
    eventually!(hub.room_count().await == 0);
    assert!(store.matches().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_closes_earlier_connection() {
    let (hub, _) = hub();
    let (mut a, mut b) = paired(&hub, &quick_draw()).await;
    a.next_of("start").await;
    b.next_of("start").await;

    let again = FakeClient::connect(1, &quick_draw());
    let new_room = hub.assign_client(again.handle.clone()).await.unwrap();
    assert_eq!(hub.room_of(UserId(1)).await, Some(new_room));

    match a.next_of("error").await {
        ServerMessage::Error(e) => assert_eq!(e.message, "replaced by a newer connection"),
        other => panic!("unexpected {other:?}"),
    }
    eventually!(a.handle.is_closed());
    assert!(!again.handle.is_closed());

    let (you, reason) = result_of(b.next_of("result").await);
    assert_eq!(you, Outcome::Win);
    assert_eq!(reason, "opponent_disconnected");
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_while_waiting_closes_earlier_connection() {
    let (hub, _) = hub();
    let mut first = FakeClient::connect(1, &quick_draw());
    hub.assign_client(first.handle.clone()).await.unwrap();
    first.next_of("state").await;

    let second = FakeClient::connect(1, &quick_draw());
    hub.assign_client(second.handle.clone()).await.unwrap();

    assert!(matches!(first.next_of("error").await, ServerMessage::Error(_)));
    eventually!(first.handle.is_closed());
    assert_eq!(hub.waiting_count().await, 1);
}

// ---------------------------------------------------------------------------
// Quick-draw
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_quick_draw_rock_beats_scissors_and_persists_history() {
    let (hub, store) = hub();
    let (mut a, mut b) = paired(&hub, &quick_draw()).await;

    match a.next_of("start").await {
        ServerMessage::Start(start) => {
            assert_eq!(start.round, 1);
            assert_eq!(start.timeout_secs, 15);
        }
        other => panic!("unexpected {other:?}"),
    }
    b.next_of("start").await;

    a.send(json!({"type": "move", "value": "rock"})).await;
    b.send(json!({"type": "move", "value": "scissors"})).await;

    assert_eq!(result_of(a.next_of("result").await), (Outcome::Win, "rock_beats_scissors".into()));
    assert_eq!(result_of(b.next_of("result").await), (Outcome::Lose, "rock_beats_scissors".into()));

    eventually!(store.history().await.len() == 2);
    let a_rows = store.history_for(UserId(1)).await;
    let a_row = &a_rows[0];
    assert_eq!((a_row.result, a_row.bet_amount, a_row.win_amount), (Outcome::Win, 100, 200));
    assert_eq!(a_row.opponent_id, UserId(2));
    assert_eq!(a_row.currency, "gems");
    let b_rows = store.history_for(UserId(2)).await;
    let b_row = &b_rows[0];
    assert_eq!((b_row.result, b_row.win_amount), (Outcome::Lose, 0));

    let records = store.matches().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner, Some(UserId(1)));
    assert_eq!(records[0].moves["1"], "rock");
    assert_eq!(records[0].moves["2"], "scissors");

    eventually!(hub.room_count().await == 0);
}

#[tokio::test(start_paused = true)]
async fn test_move_sent_before_registration_is_replayed_in_order() {
    let (hub, _) = hub();
    let mut a = FakeClient::connect(1, &quick_draw());
    hub.assign_client(a.handle.clone()).await.unwrap();

    // B moves twice before matchmaking: only the first may count
    let mut b = FakeClient::connect(2, &quick_draw());
    b.send(json!({"type": "move", "value": "paper"})).await;
    b.send(json!({"type": "move", "value": "scissors"})).await;
    assert_eq!(b.handle.pending_len(), 2);

    hub.assign_client(b.handle.clone()).await.unwrap();
    a.next_of("start").await;
    a.send(json!({"type": "move", "value": "rock"})).await;

    match b.next_of("error").await {
        ServerMessage::Error(e) => assert_eq!(e.message, "already moved this round"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(result_of(b.next_of("result").await), (Outcome::Win, "paper_beats_rock".into()));
    assert_eq!(result_of(a.next_of("result").await), (Outcome::Lose, "paper_beats_rock".into()));
}

#[tokio::test(start_paused = true)]
async fn test_missed_turn_is_forced_to_rock() {
    let (hub, _) = hub();
    let (mut a, mut b) = paired(&hub, &quick_draw()).await;
    a.next_of("start").await;
    b.next_of("start").await;

    a.send(json!({"type": "move", "value": "paper"})).await;
    // B never moves; the 15s turn timer forces rock

    assert_eq!(result_of(a.next_of("result").await), (Outcome::Win, "paper_beats_rock".into()));
    assert_eq!(result_of(b.next_of("result").await), (Outcome::Lose, "paper_beats_rock".into()));
}

#[tokio::test(start_paused = true)]
async fn test_bad_frames_are_reported_only_to_sender() {
    let (hub, _) = hub();
    let (mut a, mut b) = paired(&hub, &quick_draw()).await;
    a.next_of("start").await;
    b.next_of("start").await;

    a.handle
        .forward(b"not json".to_vec(), Duration::from_secs(1))
        .await
        .unwrap();
    a.send(json!({"type": "dance"})).await;
    a.send(json!({"type": "move", "value": "lizard"})).await;
    a.send(json!({"type": "setup", "value": [1, 2, 3]})).await;
    for _ in 0..4 {
        assert_eq!(a.next().await.kind(), "error");
    }

    a.send(json!({"type": "move", "value": 0})).await;
    b.send(json!({"type": "move", "value": "Rock"})).await;
    assert_eq!(result_of(a.next().await).1, "same_move");
    // B saw no errors, only the result
    assert_eq!(result_of(b.next().await), (Outcome::Draw, "same_move".into()));
}

// ---------------------------------------------------------------------------
// Duel-board
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_duel_board_single_hit_ends_match() {
    let (hub, store) = hub();
    let (mut a, mut b) = paired(&hub, &duel_board()).await;
    a.next_of("matched").await;
    b.next_of("matched").await;

    a.send(json!({"type": "move", "value": 4})).await;
    assert_eq!(a.next_of("error").await.kind(), "error");

    a.send(json!({"type": "setup", "value": [0, 1, 2]})).await;
    b.send(json!({"type": "setup", "value": [6, 7, 8]})).await;
    assert_eq!(a.next().await, ServerMessage::SetupComplete);
    assert_eq!(b.next().await, ServerMessage::SetupComplete);

    match a.next_of("start").await {
        ServerMessage::Start(start) => {
            assert_eq!(start.round, 1);
            assert_eq!(start.timeout_secs, 20);
            assert_eq!(start.state["your_mines"], json!([0, 1, 2]));
            assert!(start.state["opponent_mines"].is_null());
        }
        other => panic!("unexpected {other:?}"),
    }
    b.next_of("start").await;

    // round 1: nobody hits
    a.send(json!({"type": "move", "value": 3})).await;
    b.send(json!({"type": "move", "value": "4"})).await;
    match a.next_of("start").await {
        ServerMessage::Start(start) => assert_eq!(start.round, 2),
        other => panic!("unexpected {other:?}"),
    }
    b.next_of("start").await;

    // round 2: A steps on B's mine
    a.send(json!({"type": "move", "value": 7})).await;
    b.send(json!({"type": "move", "value": 5})).await;

    assert_eq!(result_of(a.next_of("result").await), (Outcome::Lose, "opponent_hit_mine".into()));
    assert_eq!(result_of(b.next_of("result").await), (Outcome::Win, "opponent_hit_mine".into()));

    eventually!(store.history().await.len() == 2);
    let b_rows = store.history_for(UserId(2)).await;
    let b_row = &b_rows[0];
    assert_eq!(b_row.game_type, "duel-board");
    assert_eq!(b_row.win_amount, 100);
}

#[tokio::test(start_paused = true)]
async fn test_duel_board_missed_setup_places_mines() {
    let (hub, _) = hub();
    let (mut a, mut b) = paired(&hub, &duel_board()).await;
    a.next_of("matched").await;
    b.next_of("matched").await;

    a.send(json!({"type": "setup", "value": [0, 1, 2]})).await;
    // B never sets up; the 30s setup timer places mines for them
    assert_eq!(b.next_of("setup_complete").await, ServerMessage::SetupComplete);

    match b.next_of("start").await {
        ServerMessage::Start(start) => {
            let mines = start.state["your_mines"].as_array().unwrap();
            assert_eq!(mines.len(), 3);
        }
        other => panic!("unexpected {other:?}"),
    }
    a.next_of("start").await;
}

#[tokio::test(start_paused = true)]
async fn test_duel_board_draws_after_round_cap() {
    let (hub, _) = hub();
    let (mut a, mut b) = paired(&hub, &duel_board()).await;
    a.next_of("matched").await;
    b.next_of("matched").await;
    a.send(json!({"type": "setup", "value": [0, 1, 2]})).await;
    b.send(json!({"type": "setup", "value": [6, 7, 8]})).await;

    // A guesses safe cells on B's board, B guesses safe cells on A's
    for (guess_a, guess_b) in [(0, 3), (1, 4), (2, 5), (3, 6), (4, 7)] {
        a.next_of("start").await;
        b.next_of("start").await;
        a.send(json!({"type": "move", "value": guess_a})).await;
        b.send(json!({"type": "move", "value": guess_b})).await;
    }

    assert_eq!(result_of(a.next_of("result").await), (Outcome::Draw, "round_limit".into()));
    assert_eq!(result_of(b.next_of("result").await), (Outcome::Draw, "round_limit".into()));
}
