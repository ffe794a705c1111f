//! Integration tests for the Take 5 server over real WebSocket connections.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use take5::prelude::*;
use take5_protocol::{Identity, StatePayload};
use take5_room::rules::card;
use take5_room::{PlayAction, Player, Room, Row};
use take5_store::{IdentityResolver, SnapshotStore};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port with an in-memory store and returns
/// the address.
async fn start_server() -> String {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let server = Take5Server::builder()
        .bind("127.0.0.1:0")
        .build(store)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

/// An in-memory store plus a room `r1` owned by the first of `names`, with
/// an offline seat for each name under the id the store resolves it to.
fn stored_room(names: &[&str]) -> (Arc<SqliteStore>, Room, Vec<UserId>) {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let ids: Vec<UserId> = names
        .iter()
        .map(|name| store.resolve_user_id(name).expect("resolve"))
        .collect();
    let mut room = Room::new(RoomId::from("r1"), ids[0].clone(), GameConfig::default());
    for (id, name) in ids.iter().zip(names) {
        room.players.insert(id.clone(), Player::new(id.clone(), *name));
    }
    (store, room, ids)
}

/// Saves `room` and starts a server that restores it on startup.
async fn start_server_with(store: Arc<SqliteStore>, room: &Room) -> String {
    store.upsert_room_snapshot(room).expect("save room");
    let server = Take5Server::builder()
        .bind("127.0.0.1:0")
        .build(store)
        .await
        .expect("server should build");
    assert_eq!(server.restore_rooms().await.expect("restore"), 1);

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn recv_info(ws: &mut ClientWs) -> String {
    match recv_until(ws, |m| matches!(m, ServerMessage::Info(_))).await {
        ServerMessage::Info(text) => text,
        other => panic!("expected info, got {other:?}"),
    }
}

async fn connect(addr: &str, path: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, action: Action) {
    let text = serde_json::to_string(&action).expect("encode");
    ws.send(Message::text(text)).await.expect("send");
}

/// Next server message, or `None` once the server has closed the socket.
async fn recv(ws: &mut ClientWs) -> Option<ServerMessage> {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for the server");
        match next {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).expect("decode"));
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Skips messages until one matches `pred`.
async fn recv_until(
    ws: &mut ClientWs,
    mut pred: impl FnMut(&ServerMessage) -> bool,
) -> ServerMessage {
    loop {
        let msg = recv(ws).await.expect("connection closed early");
        if pred(&msg) {
            return msg;
        }
    }
}

async fn recv_state(ws: &mut ClientWs, pred: impl Fn(&StatePayload) -> bool) -> StatePayload {
    match recv_until(ws, |m| matches!(m, ServerMessage::State(s) if pred(s))).await {
        ServerMessage::State(state) => state,
        other => panic!("expected state, got {other:?}"),
    }
}

/// Creates `room` as `name` and consumes the join messages.
async fn create(addr: &str, name: &str, room: &str) -> (ClientWs, Identity) {
    let mut ws = connect(addr, "/ws").await;
    send(
        &mut ws,
        Action::new(ActionKind::CreateRoom)
            .with_payload(name)
            .with_room(room),
    )
    .await;
    let identity = match recv(&mut ws).await {
        Some(ServerMessage::Identity(identity)) => identity,
        other => panic!("expected identity, got {other:?}"),
    };
    recv_until(&mut ws, |m| matches!(m, ServerMessage::Stats(_))).await;
    (ws, identity)
}

/// Logs into `room` as `name` and consumes the join messages.
async fn login(addr: &str, name: &str, room: &str) -> (ClientWs, Identity) {
    let mut ws = connect(addr, "/ws").await;
    send(
        &mut ws,
        Action::new(ActionKind::Login).with_payload(name).with_room(room),
    )
    .await;
    let identity = match recv(&mut ws).await {
        Some(ServerMessage::Identity(identity)) => identity,
        other => panic!("expected identity, got {other:?}"),
    };
    recv_until(&mut ws, |m| matches!(m, ServerMessage::Stats(_))).await;
    (ws, identity)
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_lobby_gets_list_on_connect_and_after_create() {
    let addr = start_server().await;
    let mut lobby = connect(&addr, LOBBY_PATH).await;

    assert_eq!(recv(&mut lobby).await, Some(ServerMessage::RoomList(vec![])));

    let (_alice, _) = create(&addr, "Alice", "r1").await;

    let msg = recv_until(&mut lobby, |m| {
        matches!(m, ServerMessage::RoomList(list) if list.first().is_some_and(|s| s.player_count == 1))
    })
    .await;
    let ServerMessage::RoomList(list) = msg else {
        unreachable!()
    };
    assert_eq!(list[0].id, RoomId::from("r1"));
    assert_eq!(list[0].owner_name, "Alice");
    assert_eq!(list[0].status, RoomStatus::Waiting);
}

#[tokio::test]
async fn test_create_room_sends_identity_state_and_stats() {
    let addr = start_server().await;
    let mut ws = connect(&addr, "/ws").await;
    send(
        &mut ws,
        Action::new(ActionKind::CreateRoom)
            .with_payload("  Alice ")
            .with_room("r1"),
    )
    .await;

    let identity = match recv(&mut ws).await {
        Some(ServerMessage::Identity(identity)) => identity,
        other => panic!("expected identity, got {other:?}"),
    };
    assert_eq!(identity.name, "Alice");
    assert!(identity.id.as_str().starts_with("user_"));

    match recv(&mut ws).await {
        Some(ServerMessage::State(state)) => {
            assert_eq!(state.room_id, RoomId::from("r1"));
            assert_eq!(state.public_state.status, RoomStatus::Waiting);
            assert_eq!(state.public_state.owner_id, identity.id);
            assert!(state.public_state.players[&identity.id].is_owner);
            assert!(state.my_hand.is_empty());
        }
        other => panic!("expected state, got {other:?}"),
    }
    assert_eq!(recv(&mut ws).await, Some(ServerMessage::Stats(vec![])));
}

#[tokio::test]
async fn test_duplicate_room_is_rejected() {
    let addr = start_server().await;
    let (_alice, _) = create(&addr, "Alice", "r1").await;

    let mut bob = connect(&addr, "/ws").await;
    send(
        &mut bob,
        Action::new(ActionKind::CreateRoom)
            .with_payload("Bob")
            .with_room("r1"),
    )
    .await;
    assert_eq!(
        recv(&mut bob).await,
        Some(ServerMessage::Error("Room already exists".into()))
    );
}

#[tokio::test]
async fn test_login_to_missing_room_is_an_error() {
    let addr = start_server().await;
    let mut ws = connect(&addr, "/ws").await;
    send(
        &mut ws,
        Action::new(ActionKind::Login).with_payload("Bob").with_room("nope"),
    )
    .await;

    assert!(matches!(recv(&mut ws).await, Some(ServerMessage::Identity(_))));
    assert_eq!(
        recv(&mut ws).await,
        Some(ServerMessage::Error("Room not found".into()))
    );
}

#[tokio::test]
async fn test_same_name_gets_same_identity() {
    let addr = start_server().await;
    let (_alice, first) = create(&addr, "Alice", "r1").await;
    let (_again, second) = login(&addr, "Alice", "r1").await;
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn test_two_ready_players_start_a_game() {
    let addr = start_server().await;
    let (mut alice, _) = create(&addr, "Alice", "r1").await;
    let (mut bob, _) = login(&addr, "Bob", "r1").await;

    send(&mut alice, Action::new(ActionKind::Ready)).await;
    send(&mut bob, Action::new(ActionKind::Ready)).await;

    let state = recv_state(&mut alice, |s| s.public_state.status == RoomStatus::Playing).await;
    assert_eq!(state.my_hand.len(), 10);
    assert!(state.my_hand.windows(2).all(|w| w[0].value < w[1].value));
    assert_eq!(state.public_state.rows.len(), 4);
    assert!(state.public_state.rows.iter().all(|r| r.cards.len() == 1));

    let state = recv_state(&mut bob, |s| s.public_state.status == RoomStatus::Playing).await;
    assert_eq!(state.my_hand.len(), 10);
}

#[tokio::test]
async fn test_played_card_is_marked_selected() {
    let addr = start_server().await;
    let (mut alice, alice_id) = create(&addr, "Alice", "r1").await;
    let (mut bob, _) = login(&addr, "Bob", "r1").await;

    send(&mut alice, Action::new(ActionKind::Ready)).await;
    send(&mut bob, Action::new(ActionKind::Ready)).await;
    let state = recv_state(&mut alice, |s| s.public_state.status == RoomStatus::Playing).await;

    let card = state.my_hand[0].value;
    send(
        &mut alice,
        Action::new(ActionKind::PlayCard).with_value(i64::from(card)),
    )
    .await;

    let state = recv_state(&mut alice, |s| s.my_selected_card.is_some()).await;
    assert_eq!(state.my_selected_card, Some(card));
    assert!(state.public_state.players[&alice_id.id].has_selected);
}

#[tokio::test]
async fn test_delete_room_requires_owner() {
    let addr = start_server().await;
    let (mut alice, _) = create(&addr, "Alice", "r1").await;
    let (mut bob, _) = login(&addr, "Bob", "r1").await;

    send(&mut bob, Action::new(ActionKind::DeleteRoom)).await;
    recv_until(&mut bob, |m| {
        *m == ServerMessage::Info("Only the owner can close the room".into())
    })
    .await;

    send(&mut alice, Action::new(ActionKind::DeleteRoom)).await;
    recv_until(&mut bob, |m| {
        *m == ServerMessage::Info("The owner closed the room".into())
    })
    .await;
    assert_eq!(recv(&mut bob).await, Some(ServerMessage::RoomClosed(String::new())));
    assert_eq!(recv(&mut bob).await, None);

    let mut lobby = connect(&addr, LOBBY_PATH).await;
    recv_until(&mut lobby, |m| *m == ServerMessage::RoomList(vec![])).await;
}

#[tokio::test]
async fn test_leave_closes_the_connection() {
    let addr = start_server().await;
    let (mut alice, _) = create(&addr, "Alice", "r1").await;
    let (mut bob, bob_id) = login(&addr, "Bob", "r1").await;

    send(&mut bob, Action::new(ActionKind::LeaveRoom)).await;
    assert_eq!(recv(&mut bob).await, None);

    let state = recv_state(&mut alice, |s| s.public_state.players.len() == 1).await;
    assert!(!state.public_state.players.contains_key(&bob_id.id));
}

#[tokio::test]
async fn test_reconnect_mid_game_keeps_hand() {
    let addr = start_server().await;
    let (mut alice, _) = create(&addr, "Alice", "r1").await;
    let (mut bob, bob_id) = login(&addr, "Bob", "r1").await;

    send(&mut alice, Action::new(ActionKind::Ready)).await;
    send(&mut bob, Action::new(ActionKind::Ready)).await;
    let before = recv_state(&mut bob, |s| s.public_state.status == RoomStatus::Playing).await;

    bob.close(None).await.expect("close");
    drop(bob);
    recv_state(&mut alice, |s| {
        s.public_state
            .players
            .get(&bob_id.id)
            .is_some_and(|p| !p.is_online)
    })
    .await;

    let mut bob = connect(&addr, "/ws").await;
    send(
        &mut bob,
        Action::new(ActionKind::Login).with_payload("Bob").with_room("r1"),
    )
    .await;
    let after = recv_state(&mut bob, |_| true).await;
    assert_eq!(after.public_state.status, RoomStatus::Playing);
    assert_eq!(after.my_hand, before.my_hand);
    assert!(after.public_state.players[&bob_id.id].is_online);
}

#[tokio::test]
async fn test_malformed_action_closes_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr, "/ws").await;
    ws.send(Message::text("not json")).await.expect("send");
    assert_eq!(recv(&mut ws).await, None);
}

#[tokio::test]
async fn test_unknown_action_is_ignored() {
    let addr = start_server().await;
    let mut ws = connect(&addr, "/ws").await;
    ws.send(Message::text(r#"{"type":"dance"}"#)).await.expect("send");
    send(
        &mut ws,
        Action::new(ActionKind::Login).with_payload("Bob").with_room("nope"),
    )
    .await;
    assert!(matches!(recv(&mut ws).await, Some(ServerMessage::Identity(_))));
}

#[tokio::test]
async fn test_rooms_are_restored_from_the_store() {
    let path = std::env::temp_dir().join(format!(
        "take5-restore-{}-{}.db",
        std::process::id(),
        unique_suffix()
    ));

    {
        let store = Arc::new(SqliteStore::open(&path).expect("store"));
        let server = Take5Server::builder()
            .bind("127.0.0.1:0")
            .build(store)
            .await
            .expect("build");
        let addr = server.local_addr().expect("addr").to_string();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));
        let (_alice, _) = create(&addr, "Alice", "saved").await;
        let _ = tx.send(());
        running.await.expect("join").expect("run");
    }

    let store = Arc::new(SqliteStore::open(&path).expect("store"));
    let server = Take5Server::builder()
        .bind("127.0.0.1:0")
        .build(store)
        .await
        .expect("build");
    assert_eq!(server.restore_rooms().await.expect("restore"), 1);
    let addr = server.local_addr().expect("addr").to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let mut lobby = connect(&addr, LOBBY_PATH).await;
    match recv(&mut lobby).await {
        Some(ServerMessage::RoomList(list)) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].id, RoomId::from("saved"));
            assert_eq!(list[0].owner_name, "Alice");
        }
        other => panic!("expected room list, got {other:?}"),
    }
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_replaced_connection_cannot_act_for_the_player() {
    let addr = start_server().await;
    let (mut stale, _) = create(&addr, "Alice", "r1").await;
    let (mut bob, _) = login(&addr, "Bob", "r1").await;

    send(&mut stale, Action::new(ActionKind::Ready)).await;
    send(&mut bob, Action::new(ActionKind::Ready)).await;
    let state = recv_state(&mut stale, |s| s.public_state.status == RoomStatus::Playing).await;
    let (first, second) = (state.my_hand[0].value, state.my_hand[1].value);

    let (mut alice, _) = login(&addr, "Alice", "r1").await;

    send(
        &mut stale,
        Action::new(ActionKind::PlayCard).with_value(i64::from(first)),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send(
        &mut alice,
        Action::new(ActionKind::PlayCard).with_value(i64::from(second)),
    )
    .await;

    let state = recv_state(&mut alice, |s| s.my_selected_card.is_some()).await;
    assert_eq!(state.my_selected_card, Some(second));
}

#[tokio::test]
async fn test_force_restart_needs_two_players_online() {
    let addr = start_server().await;
    let (mut alice, _) = create(&addr, "Alice", "r1").await;

    send(&mut alice, Action::new(ActionKind::ForceRestart)).await;
    assert_eq!(
        recv_info(&mut alice).await,
        "Not enough players online to start (1/2)"
    );
}

#[tokio::test]
async fn test_only_the_owner_can_restart() {
    let (store, mut room, ids) = stored_room(&["Alice", "Bob"]);
    room.status = RoomStatus::Finished;
    room.epoch = 1;
    if let Some(alice) = room.players.get_mut(&ids[0]) {
        alice.captured = vec![card(55)];
        alice.score = 7;
    }
    let addr = start_server_with(store, &room).await;
    let (mut alice, _) = login(&addr, "Alice", "r1").await;
    let (mut bob, _) = login(&addr, "Bob", "r1").await;

    for kind in [ActionKind::Restart, ActionKind::ForceRestart] {
        send(&mut bob, Action::new(kind)).await;
        assert_eq!(recv_info(&mut bob).await, "Only the owner can do that");
    }

    send(&mut alice, Action::new(ActionKind::Restart)).await;
    let state = recv_state(&mut alice, |s| s.public_state.status == RoomStatus::Waiting).await;
    assert!(state.public_state.players.values().all(|p| p.score == 0 && !p.ready));
    assert!(state.public_state.rows.iter().all(|r| r.cards.is_empty()));

    send(&mut alice, Action::new(ActionKind::ForceRestart)).await;
    assert_eq!(recv_info(&mut bob).await, "Alice forced a restart");
    let state = recv_state(&mut bob, |s| s.public_state.status == RoomStatus::Playing).await;
    assert_eq!(state.my_hand.len(), 10);
}

#[tokio::test]
async fn test_only_the_pending_player_chooses_a_row() {
    let (store, mut room, ids) = stored_room(&["Alice", "Bob"]);
    let (alice_id, bob_id) = (ids[0].clone(), ids[1].clone());
    for (row, value) in room.rows.iter_mut().zip([10, 20, 30, 40]) {
        *row = Row::from_cards(vec![card(value)]);
    }
    if let Some(alice) = room.players.get_mut(&alice_id) {
        alice.hand = vec![card(60)];
    }
    if let Some(bob) = room.players.get_mut(&bob_id) {
        bob.hand = vec![card(50), card(70)];
    }
    let low = PlayAction {
        player_id: alice_id.clone(),
        card: card(5),
    };
    room.turn_queue = VecDeque::from([
        low.clone(),
        PlayAction {
            player_id: bob_id.clone(),
            card: card(50),
        },
    ]);
    room.pending = Some(low);
    room.status = RoomStatus::ChoosingRow;
    room.epoch = 1;

    let addr = start_server_with(store, &room).await;
    let (mut alice, _) = login(&addr, "Alice", "r1").await;
    let (mut bob, _) = login(&addr, "Bob", "r1").await;

    send(&mut bob, Action::new(ActionKind::ChooseRow).with_value(0)).await;
    send(
        &mut bob,
        Action::new(ActionKind::Login).with_payload("Bob").with_room("r1"),
    )
    .await;
    let state = recv_state(&mut bob, |_| true).await;
    assert_eq!(state.public_state.status, RoomStatus::ChoosingRow);
    assert_eq!(state.public_state.pending_player_id, alice_id.to_string());
    assert_eq!(state.public_state.rows[0].cards, vec![card(10)]);

    send(&mut alice, Action::new(ActionKind::ChooseRow).with_value(2)).await;
    let state = recv_state(&mut bob, |s| s.public_state.status == RoomStatus::Playing).await;
    assert_eq!(state.public_state.rows[0].cards, vec![card(10)]);
    assert_eq!(state.public_state.rows[2].cards, vec![card(5)]);
    assert_eq!(state.public_state.rows[3].cards, vec![card(40), card(50)]);
    assert_eq!(state.public_state.players[&alice_id].score, 3);
    assert_eq!(state.my_hand, vec![card(70)]);
}

fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}
