use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

use frontdesk::engine::Engine;
use frontdesk::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join("frontdesk_int_test");
    std::fs::create_dir_all(&dir).unwrap();
    let wal_path = dir.join(format!("{}.wal", Ulid::new()));
    let engine = Arc::new(Engine::new(wal_path).unwrap());

    let server_engine = engine.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = server_engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine, "frontdesk".to_string(), None)
                    .await;
            });
        }
    });

    (addr, engine)
}

async fn connect(addr: SocketAddr, user: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("hotel")
        .user(user)
        .password("frontdesk");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

/// Data rows of a simple query result (drops RowDescription/CommandComplete).
fn data_rows(messages: Vec<SimpleQueryMessage>) -> Vec<tokio_postgres::SimpleQueryRow> {
    messages
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn create_room(
    client: &tokio_postgres::Client,
    number: &str,
    class: &str,
    price: &str,
) -> Ulid {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO rooms (id, number, class, nightly_price) VALUES ('{id}', '{number}', '{class}', {price})"
        ))
        .await
        .unwrap();
    id
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn room_catalog_round_trip() {
    let (addr, _engine) = start_test_server().await;
    let manager = connect(addr, "manager").await;

    create_room(&manager, "101", "comfort", "120.00").await;
    create_room(&manager, "201", "comfort-plus", "180.00").await;

    let guest = connect(addr, "alice").await;
    let rows = data_rows(guest.simple_query("SELECT * FROM rooms").await.unwrap());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("number"), Some("101"));
    assert_eq!(rows[0].get("class"), Some("comfort"));
    assert_eq!(rows[1].get("number"), Some("201"));
}

#[tokio::test]
async fn guest_cannot_mutate_catalog() {
    let (addr, _engine) = start_test_server().await;
    let guest = connect(addr, "alice").await;

    let id = Ulid::new();
    let err = guest
        .batch_execute(&format!(
            "INSERT INTO rooms (id, number, class, nightly_price) VALUES ('{id}', '101', 'comfort', 99)"
        ))
        .await
        .unwrap_err();
    let db_err = err.as_db_error().expect("expected db error");
    assert_eq!(db_err.code().code(), "42501");
}

#[tokio::test]
async fn guest_cannot_read_revenue() {
    let (addr, _engine) = start_test_server().await;
    let guest = connect(addr, "alice").await;

    let err = guest
        .simple_query("SELECT * FROM revenue WHERE year = 2024")
        .await
        .unwrap_err();
    assert_eq!(err.as_db_error().unwrap().code().code(), "42501");
}

#[tokio::test]
async fn booking_flow_and_double_book_rejection() {
    let (addr, _engine) = start_test_server().await;
    let manager = connect(addr, "manager").await;
    let room = create_room(&manager, "101", "comfort", "120.00").await;

    let guest = connect(addr, "alice").await;
    let booking = Ulid::new();
    let guest_id = Ulid::new();
    guest
        .batch_execute(&format!(
            "INSERT INTO bookings (id, room_id, guest_id, check_in, check_out, guests, children) \
             VALUES ('{booking}', '{room}', '{guest_id}', '2024-07-01', '2024-07-05', 2, 0)"
        ))
        .await
        .unwrap();

    // Overlapping stay is rejected
    let other = Ulid::new();
    let err = guest
        .batch_execute(&format!(
            "INSERT INTO bookings (id, room_id, guest_id, check_in, check_out) \
             VALUES ('{other}', '{room}', '{guest_id}', '2024-07-03', '2024-07-06')"
        ))
        .await
        .unwrap_err();
    assert!(err.as_db_error().unwrap().message().contains("unavailable"));

    // Back-to-back is accepted
    let next = Ulid::new();
    guest
        .batch_execute(&format!(
            "INSERT INTO bookings (id, room_id, guest_id, check_in, check_out) \
             VALUES ('{next}', '{room}', '{guest_id}', '2024-07-05', '2024-07-08')"
        ))
        .await
        .unwrap();

    let rows = data_rows(
        guest
            .simple_query(&format!("SELECT * FROM bookings WHERE room_id = '{room}'"))
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn availability_reflects_bookings() {
    let (addr, _engine) = start_test_server().await;
    let manager = connect(addr, "manager").await;
    let booked = create_room(&manager, "101", "comfort", "120.00").await;
    create_room(&manager, "102", "comfort", "100.00").await;

    let guest = connect(addr, "alice").await;
    let booking = Ulid::new();
    let guest_id = Ulid::new();
    guest
        .batch_execute(&format!(
            "INSERT INTO bookings (id, room_id, guest_id, check_in, check_out) \
             VALUES ('{booking}', '{booked}', '{guest_id}', '2024-07-01', '2024-07-05')"
        ))
        .await
        .unwrap();

    let rows = data_rows(
        guest
            .simple_query(
                "SELECT * FROM availability WHERE check_in = '2024-07-02' AND check_out = '2024-07-04'",
            )
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("number"), Some("102"));

    // Disjoint dates see both rooms
    let rows = data_rows(
        guest
            .simple_query(
                "SELECT * FROM availability WHERE check_in = '2024-08-01' AND check_out = '2024-08-03'",
            )
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn availability_cheapest_per_class() {
    let (addr, _engine) = start_test_server().await;
    let manager = connect(addr, "manager").await;
    create_room(&manager, "101", "comfort", "120.00").await;
    create_room(&manager, "102", "comfort", "100.00").await;
    create_room(&manager, "301", "apartment", "300.00").await;

    let guest = connect(addr, "alice").await;
    let rows = data_rows(
        guest
            .simple_query(
                "SELECT * FROM availability WHERE check_in = '2024-07-01' AND check_out = '2024-07-03' AND cheapest = true",
            )
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("number"), Some("102"));
    assert_eq!(rows[1].get("number"), Some("301"));
}

#[tokio::test]
async fn occupancy_is_inclusive_and_cancellation_frees() {
    let (addr, _engine) = start_test_server().await;
    let manager = connect(addr, "manager").await;
    let room = create_room(&manager, "101", "comfort", "120.00").await;

    let guest = connect(addr, "alice").await;
    let booking = Ulid::new();
    let guest_id = Ulid::new();
    guest
        .batch_execute(&format!(
            "INSERT INTO bookings (id, room_id, guest_id, check_in, check_out) \
             VALUES ('{booking}', '{room}', '{guest_id}', '2024-06-01', '2024-06-03')"
        ))
        .await
        .unwrap();

    let rows = data_rows(
        guest
            .simple_query(&format!("SELECT * FROM occupancy WHERE room_id = '{room}'"))
            .await
            .unwrap(),
    );
    let days: Vec<&str> = rows.iter().map(|r| r.get("day").unwrap()).collect();
    assert_eq!(days, vec!["2024-06-01", "2024-06-02", "2024-06-03"]);

    guest
        .batch_execute(&format!("DELETE FROM bookings WHERE id = '{booking}'"))
        .await
        .unwrap();

    let rows = data_rows(
        guest
            .simple_query(&format!("SELECT * FROM occupancy WHERE room_id = '{room}'"))
            .await
            .unwrap(),
    );
    assert!(rows.is_empty());

    // The freed range can be rebooked
    let again = Ulid::new();
    guest
        .batch_execute(&format!(
            "INSERT INTO bookings (id, room_id, guest_id, check_in, check_out) \
             VALUES ('{again}', '{room}', '{guest_id}', '2024-06-01', '2024-06-03')"
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn revenue_report_has_twelve_months() {
    let (addr, _engine) = start_test_server().await;
    let manager = connect(addr, "manager").await;
    let room_a = create_room(&manager, "101", "comfort", "100").await;
    let room_b = create_room(&manager, "102", "comfort", "50").await;

    let guest = connect(addr, "alice").await;
    let guest_id = Ulid::new();
    for (room, check_in, check_out) in [
        (room_a, "2024-01-10", "2024-01-12"),
        (room_b, "2024-01-20", "2024-01-21"),
    ] {
        let id = Ulid::new();
        guest
            .batch_execute(&format!(
                "INSERT INTO bookings (id, room_id, guest_id, check_in, check_out) \
                 VALUES ('{id}', '{room}', '{guest_id}', '{check_in}', '{check_out}')"
            ))
            .await
            .unwrap();
    }

    let rows = data_rows(
        manager
            .simple_query("SELECT * FROM revenue WHERE year = 2024")
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0].get("month"), Some("1"));
    assert_eq!(rows[0].get("nights"), Some("3"));
    assert_eq!(rows[0].get("revenue"), Some("250"));
    for row in &rows[1..] {
        assert_eq!(row.get("nights"), Some("0"));
    }
}

#[tokio::test]
async fn update_room_price_as_manager() {
    let (addr, _engine) = start_test_server().await;
    let manager = connect(addr, "manager").await;
    let room = create_room(&manager, "101", "comfort", "120.00").await;

    manager
        .batch_execute(&format!(
            "UPDATE rooms SET nightly_price = 150.00 WHERE id = '{room}'"
        ))
        .await
        .unwrap();

    let rows = data_rows(manager.simple_query("SELECT * FROM rooms").await.unwrap());
    assert_eq!(rows[0].get("nightly_price"), Some("150.00"));
}
