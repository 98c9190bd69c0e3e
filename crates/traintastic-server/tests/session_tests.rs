//! End-to-end session tests
//!
//! Each test starts a real server on an ephemeral port and drives it through
//! the client crate: login and session setup, object leasing, property echo,
//! table windows, discovery, and the simulation kernel path.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use traintastic_client::{Client, ClientError, ObjectMirror};
use traintastic_core::{AttributeName, ErrorCode, TriState, Value};
use traintastic_server::{ServerRuntime, Settings};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn test_settings() -> Settings {
    Settings {
        server_name: "test-server".to_owned(),
        tcp_port: 0,
        ..Settings::default()
    }
}

async fn start_server() -> (ServerRuntime, SocketAddr) {
    let runtime = ServerRuntime::start(test_settings())
        .await
        .expect("server start");
    let addr = SocketAddr::from(([127, 0, 0, 1], runtime.local_addr().port()));
    (runtime, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    Client::connect(addr, "admin", "").await.expect("connect")
}

/// Forward value-change events of one property into a channel.
fn watch_value(mirror: &ObjectMirror, property: &str) -> UnboundedReceiver<Value> {
    let (tx, rx) = unbounded_channel();
    mirror.on_value_changed(property, move |value| {
        let _ = tx.send(value.clone());
    });
    rx
}

async fn recv_value(rx: &mut UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for event")
        .expect("event channel closed")
}

async fn assert_no_event(rx: &mut UnboundedReceiver<Value>) {
    let result = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(result.is_err(), "unexpected event: {:?}", result);
}

// ----------------------------------------------------------------------------
// Login & Session
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_login_and_new_session() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;
    assert!(!client.session_uuid().is_nil());
    drop(client);
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_rejected_with_wrong_password() {
    let (runtime, addr) = start_server().await;
    let err = Client::connect(addr, "admin", "wrong")
        .await
        .expect_err("login must fail");
    assert!(matches!(
        err,
        ClientError::ErrorResponse(ErrorCode::AuthenticationFailed)
    ));
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_sessions_get_distinct_uuids() {
    let (runtime, addr) = start_server().await;
    let first = connect(addr).await;
    let second = connect(addr).await;
    assert_ne!(first.session_uuid(), second.session_uuid());
    runtime.shutdown();
}

// ----------------------------------------------------------------------------
// Object Leasing
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_object_leasing_clock() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let clock = client.get_object("world.clock").await.expect("get clock");
    assert_eq!(clock.class_id(), "clock");
    let hour = clock.value("hour").and_then(|v| v.as_integer()).unwrap();
    assert!((0..=23).contains(&hour));

    let first_handle = clock.handle();
    client.release_object(&clock);
    let clock_again = client.get_object("world.clock").await.expect("re-lease");
    assert_ne!(first_handle, clock_again.handle());

    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_unknown_object() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;
    let err = client.get_object("no.such.object").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::ErrorResponse(ErrorCode::UnknownObject)
    ));
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_request_drops_callback() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let request = client.request_object("world.clock");
    client.cancel_request(request.request_id());
    let err = request.finish().await.unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));

    // The connection survives a cancelled request.
    assert!(client.get_object("world.clock").await.is_ok());
    runtime.shutdown();
}

// ----------------------------------------------------------------------------
// Property Writes
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_property_write_is_echoed() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let world = client.get_object("world").await.unwrap();
    let mut events = watch_value(&world, "name");
    world.set_string("name", "hi");

    assert_eq!(recv_value(&mut events).await, Value::from("hi"));
    assert_eq!(world.value("name"), Some(Value::from("hi")));
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_property_write_idempotence() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let world = client.get_object("world").await.unwrap();
    let current = world.value("name").unwrap();
    let mut events = watch_value(&world, "name");

    // Writing the current value must not produce a broadcast.
    world.set_value("name", current);
    assert_no_event(&mut events).await;

    // A real change still does.
    world.set_string("name", "changed");
    assert_eq!(recv_value(&mut events).await, Value::from("changed"));
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_only_write_is_dropped() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let clock = client.get_object("world.clock").await.unwrap();
    let mut events = watch_value(&clock, "hour");
    clock.set_integer("hour", 12);
    assert_no_event(&mut events).await;
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_released_handle_receives_no_events() {
    let (runtime, addr) = start_server().await;
    let watcher = connect(addr).await;
    let writer = connect(addr).await;

    let watched = watcher.get_object("world").await.unwrap();
    let mut events = watch_value(&watched, "name");
    watcher.release_object(&watched);

    let world = writer.get_object("world").await.unwrap();
    let mut writer_events = watch_value(&world, "name");
    world.set_string("name", "after release");

    // The writer still observes the change, the released watcher does not.
    assert_eq!(
        recv_value(&mut writer_events).await,
        Value::from("after release")
    );
    assert_no_event(&mut events).await;
    runtime.shutdown();
}

// ----------------------------------------------------------------------------
// Table Models
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_table_window() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let trains = client.get_table_model("trains").await.unwrap();
    assert_eq!(trains.class_id(), "train_list_table_model");
    assert_eq!(trains.column_headers(), vec!["Id", "Name"]);
    assert_eq!(trains.row_count(), 3);

    let (updated_tx, mut updated_rx) = unbounded_channel();
    trains.on_updated(move || {
        let _ = updated_tx.send(());
    });

    trains.set_region(0, 1, 0, 2);
    tokio::time::timeout(Duration::from_secs(5), updated_rx.recv())
        .await
        .expect("region update")
        .unwrap();

    // Exactly one update for one region change.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), updated_rx.recv())
            .await
            .is_err()
    );

    assert_eq!(trains.text(0, 0).as_deref(), Some("train_1"));
    assert_eq!(trains.text(1, 0).as_deref(), Some("NS 1200"));
    assert_eq!(trains.text(0, 1).as_deref(), Some("train_2"));
    assert_eq!(trains.text(1, 1).as_deref(), Some("BR 01"));
    assert_eq!(trains.text(0, 2).as_deref(), Some("train_3"));
    assert_eq!(trains.text(1, 2).as_deref(), Some("TGV"));
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_table_tracks_renames() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let trains = client.get_table_model("trains").await.unwrap();
    let (updated_tx, mut updated_rx) = unbounded_channel();
    trains.on_updated(move || {
        let _ = updated_tx.send(());
    });
    trains.set_region(0, 1, 0, 2);
    tokio::time::timeout(Duration::from_secs(5), updated_rx.recv())
        .await
        .expect("initial region")
        .unwrap();

    let train = client.get_object("train_1").await.unwrap();
    train.set_string("name", "Renamed");

    // The rename lands in the subscribed window.
    tokio::time::timeout(Duration::from_secs(5), updated_rx.recv())
        .await
        .expect("cell update")
        .unwrap();
    assert_eq!(trains.text(1, 0).as_deref(), Some("Renamed"));
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_train_method_grows_table() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let trains_table = client.get_table_model("trains").await.unwrap();
    assert_eq!(trains_table.row_count(), 3);

    let trains = client.get_object("trains").await.unwrap();
    client.call_method(&trains, "add").await.expect("add train");

    // Row count is pushed to the leased table model.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while trains_table.row_count() != 4 {
        assert!(tokio::time::Instant::now() < deadline, "row count not pushed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    runtime.shutdown();
}

// ----------------------------------------------------------------------------
// Attributes
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_attribute_events_are_independent() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let interface = client.get_object("diy_1").await.unwrap();
    let (attr_tx, mut attr_rx) = unbounded_channel();
    interface.on_attribute_changed("hostname", move |attribute, value| {
        let _ = attr_tx.send((attribute, value.clone()));
    });
    let mut hostname_values = watch_value(&interface, "hostname");
    let mut status_values = watch_value(&interface, "status");

    interface.set_bool("online", true);

    // Going online disables the hostname property: one attribute event, no
    // value event for hostname.
    let (attribute, value) = tokio::time::timeout(Duration::from_secs(5), attr_rx.recv())
        .await
        .expect("attribute event")
        .unwrap();
    assert_eq!(attribute, AttributeName::Enabled);
    assert_eq!(value, Value::Boolean(false));
    assert_no_event(&mut hostname_values).await;

    // And the status property walks to online.
    let status = recv_value(&mut status_values).await;
    assert_eq!(status.as_enum_value(), Some(1)); // initializing
    let status = recv_value(&mut status_values).await;
    assert_eq!(status.as_enum_value(), Some(2)); // online
    runtime.shutdown();
}

// ----------------------------------------------------------------------------
// Simulation Kernel
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_simulated_input_change_reaches_client() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let interface = client.get_object("diy_1").await.unwrap();
    let mut status_values = watch_value(&interface, "status");
    interface.set_bool("online", true);
    // Wait for initializing, then online.
    recv_value(&mut status_values).await;
    recv_value(&mut status_values).await;

    let input = client.get_object("input_1").await.unwrap();
    let mut input_values = watch_value(&input, "value");

    // The first simulate call may race the feature handshake; retry until an
    // edge is observed. The first observed edge is always the rise to true.
    let value = loop {
        client
            .call_method(&input, "simulate_change")
            .await
            .expect("simulate");
        match tokio::time::timeout(Duration::from_millis(500), input_values.recv()).await {
            Ok(Some(value)) => break value,
            _ => continue,
        }
    };
    assert_eq!(value.as_enum_value(), Some(TriState::True.as_u8() as i64));

    // The next toggle falls back to false.
    client
        .call_method(&input, "simulate_change")
        .await
        .expect("simulate");
    let value = recv_value(&mut input_values).await;
    assert_eq!(value.as_enum_value(), Some(TriState::False.as_u8() as i64));
    runtime.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_output_request_is_confirmed_by_kernel() {
    let (runtime, addr) = start_server().await;
    let client = connect(addr).await;

    let interface = client.get_object("diy_1").await.unwrap();
    let mut status_values = watch_value(&interface, "status");
    interface.set_bool("online", true);
    recv_value(&mut status_values).await;
    recv_value(&mut status_values).await;

    let output = client.get_object("output_1").await.unwrap();
    let mut state_values = watch_value(&output, "state");

    output.set_bool("value", true);

    // Confirmation travels kernel -> controller -> property broadcast.
    let confirmed = loop {
        let value = recv_value(&mut state_values).await;
        if value.as_enum_value() == Some(TriState::True.as_u8() as i64) {
            break value;
        }
    };
    assert_eq!(
        confirmed.as_enum_value(),
        Some(TriState::True.as_u8() as i64)
    );
    runtime.shutdown();
}

// ----------------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_discovery_probe() {
    let (runtime, addr) = start_server().await;
    let discovery_port = runtime
        .discovery_addr()
        .expect("discovery enabled")
        .port();
    let probe_addr = SocketAddr::from(([127, 0, 0, 1], discovery_port));

    let info = traintastic_client::probe(probe_addr, Duration::from_secs(5))
        .await
        .expect("discovery reply");
    assert_eq!(info.name, "test-server");
    assert_eq!(info.addr.port(), addr.port());
    runtime.shutdown();
}
