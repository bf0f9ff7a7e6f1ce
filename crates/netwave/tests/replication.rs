mod common;

use netwave::{NetworkManager, PropertyValue};

use common::{client_manager, pump_until, server_manager, PlayerActor, PortAllocator};

static PORTS: PortAllocator = PortAllocator::new(42000);

fn client_player_health(client: &NetworkManager) -> Option<i32> {
    client
        .world()
        .actors()
        .find(|a| a.type_name() == "PlayerActor")
        .and_then(|a| a.core().property("Health"))
        .and_then(|p| p.value().as_i32())
}

fn connected_pair() -> (NetworkManager, NetworkManager) {
    let port = PORTS.next();
    let mut server = server_manager(port);
    let mut client = client_manager(port);

    let up = pump_until(&mut server, &mut client, 2000, |server, _| {
        server.driver().connected_count() == 1
    });
    assert!(up, "client failed to connect");
    (server, client)
}

#[test]
fn test_health_field_replicates_and_stays_quiet() {
    let (mut server, mut client) = connected_pair();

    let player_id = server.world_mut().spawn(Box::new(PlayerActor::new()));

    // Spawn reaches the client with the initial value.
    let spawned = pump_until(&mut server, &mut client, 2000, |_, client| {
        client_player_health(client) == Some(100)
    });
    assert!(spawned, "client never saw Health == 100");

    // A change propagates within an interval or two.
    server
        .world_mut()
        .actor_mut(player_id)
        .unwrap()
        .core_mut()
        .set_property("Health", PropertyValue::I32(57));

    let updated = pump_until(&mut server, &mut client, 2000, |_, client| {
        client_player_health(client) == Some(57)
    });
    assert!(updated, "client never saw Health == 57");

    // Let in-flight acks settle, then measure silence: with no property
    // changes the server must emit nothing at all.
    pump_until(&mut server, &mut client, 200, |_, _| false);

    let conn_id = client.driver().server_connection().unwrap();
    let received_before = client
        .driver()
        .connection(conn_id)
        .unwrap()
        .stats()
        .packets_received;

    // Five-plus replication intervals of simulated time.
    pump_until(&mut server, &mut client, 300, |_, _| false);

    let received_after = client
        .driver()
        .connection(conn_id)
        .unwrap()
        .stats()
        .packets_received;
    assert_eq!(
        received_before, received_after,
        "server sent packets while nothing changed"
    );

    // And the value is still intact.
    assert_eq!(client_player_health(&client), Some(57));
}

#[test]
fn test_multiple_actors_all_reach_client() {
    let (mut server, mut client) = connected_pair();

    for _ in 0..3 {
        server.world_mut().spawn(Box::new(PlayerActor::new()));
    }

    let all_there = pump_until(&mut server, &mut client, 2000, |_, client| {
        client.world().actor_count() == 3
    });
    assert!(all_there, "client world never reached 3 actors");

    // Wire net ids match the server's.
    for id in server.world().net_ids() {
        assert!(client.world().actor(id).is_some(), "missing actor {}", id);
    }
}

#[test]
fn test_destroy_propagates_to_client() {
    let (mut server, mut client) = connected_pair();

    let player_id = server.world_mut().spawn(Box::new(PlayerActor::new()));
    let spawned = pump_until(&mut server, &mut client, 2000, |_, client| {
        client.world().actor(player_id).is_some()
    });
    assert!(spawned);

    server.world_mut().destroy(player_id);

    let gone = pump_until(&mut server, &mut client, 2000, |_, client| {
        client.world().actor(player_id).is_none()
    });
    assert!(gone, "client kept a ghost actor after server destroy");
}

#[test]
fn test_late_joiner_gets_existing_state() {
    let port = PORTS.next();
    let mut server = server_manager(port);

    // The actor exists, and mutates, before any client shows up.
    let player_id = server.world_mut().spawn(Box::new(PlayerActor::new()));
    server
        .world_mut()
        .actor_mut(player_id)
        .unwrap()
        .core_mut()
        .set_property("Health", PropertyValue::I32(42));

    for _ in 0..10 {
        server.tick(0.05);
    }

    let mut client = client_manager(port);
    let synced = pump_until(&mut server, &mut client, 2000, |_, client| {
        client_player_health(client) == Some(42)
    });
    assert!(synced, "late joiner never received current property state");
}
