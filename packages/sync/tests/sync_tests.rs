//! Replication scenarios between a server and several clients

use massing_common::point;
use massing_document::{Context, Document, DocumentConfig};
use massing_sync::{recv_record, spawn_server, ClientSession, SyncError, SyncServer};

fn server() -> SyncServer {
    SyncServer::new(Document::new(0, DocumentConfig::default()).unwrap(), Context::default())
}

fn join(server: &mut SyncServer) -> ClientSession {
    let welcome = server.connect().unwrap();
    ClientSession::join(&welcome, DocumentConfig::default(), Context::default()).unwrap()
}

#[test]
fn test_own_batch_is_confirmed() {
    let mut server = server();
    let mut client = join(&mut server);
    let root = client.document().root_group_id();

    let (_, outgoing) = client
        .apply_local(|doc, ctx| doc.add_vertex(ctx, root, point(1.0, 0.0, 0.0)))
        .unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(client.unverified().count(), 1);

    let accepted = server.submit(outgoing[0].clone()).unwrap();
    client.receive(&accepted).unwrap();

    assert_eq!(client.unverified().count(), 0);
    assert_eq!(client.verified_hash(), server.hash());
    assert!(client.document().state_eq(server.document()));
}

#[test]
fn test_speculative_batch_loses_to_server_order() {
    let mut server = server();
    let mut alice = join(&mut server);
    let mut bob = join(&mut server);
    let root = server.document().root_group_id();

    // Alice reaches H1 locally
    let (vertex, alice_out) = alice
        .apply_local(|doc, ctx| doc.add_vertex(ctx, root, point(0.0, 0.0, 0.0)))
        .unwrap();
    let h1 = alice.document().hash();

    // The server commits Bob's unrelated batch first, reaching H2
    let (_, bob_out) = bob
        .apply_local(|doc, ctx| doc.create_group(ctx, root))
        .unwrap();
    let accepted = server.submit(bob_out[0].clone()).unwrap();
    let h2 = server.hash();
    assert_ne!(h1, h2);

    let rejection = server.submit(alice_out[0].clone()).unwrap_err();
    assert!(matches!(rejection, SyncError::Desync { expected, .. } if expected == h2));
    alice.handle_rejection(&rejection).unwrap();
    alice.receive(&accepted).unwrap();
    bob.receive(&accepted).unwrap();

    assert_eq!(alice.document().hash(), h2);
    assert_eq!(alice.verified_hash(), h2);
    assert!(alice.document().get_object(vertex).is_none());
    assert!(alice.document().find_graph_of_element(vertex).is_none());
    assert!(!alice.document().undo_stack().can_undo());
    assert!(alice.document().state_eq(server.document()));
    assert!(bob.document().state_eq(server.document()));
}

#[test]
fn test_foreign_broadcast_before_rejection() {
    let mut server = server();
    let mut alice = join(&mut server);
    let mut bob = join(&mut server);
    let root = server.document().root_group_id();

    alice
        .apply_local(|doc, ctx| doc.add_vertex(ctx, root, point(0.0, 0.0, 0.0)))
        .unwrap();
    let (_, bob_out) = bob
        .apply_local(|doc, ctx| doc.add_vertex(ctx, root, point(5.0, 0.0, 0.0)))
        .unwrap();
    let accepted = server.submit(bob_out[0].clone()).unwrap();

    // The broadcast overtakes the rejection
    alice.receive(&accepted).unwrap();
    assert_eq!(alice.unverified().count(), 0);
    alice
        .handle_rejection(&SyncError::Desync {
            expected: server.hash(),
            actual: 0,
        })
        .unwrap();
    assert_eq!(alice.document().hash(), server.hash());
}

#[test]
fn test_undo_is_replicated() {
    let mut server = server();
    let mut alice = join(&mut server);
    let mut bob = join(&mut server);
    let root = server.document().root_group_id();

    let (_, outgoing) = alice
        .apply_local(|doc, ctx| doc.add_edge(ctx, root, point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0)))
        .unwrap();
    let outgoing: Vec<_> = outgoing.into_iter().chain(alice.undo_local().unwrap()).collect();
    assert_eq!(outgoing.len(), 2);

    for record in outgoing {
        let accepted = server.submit(record).unwrap();
        alice.receive(&accepted).unwrap();
        bob.receive(&accepted).unwrap();
    }
    assert_eq!(server.document().find_volume_graph(root).unwrap().counts(), (0, 0, 0));
    assert!(bob.document().state_eq(server.document()));
    assert_eq!(server.records_since(0).map(<[_]>::len), Some(2));
}

#[test]
fn test_resync_from_snapshot() {
    let mut server = server();
    let mut alice = join(&mut server);
    let mut bob = join(&mut server);
    let root = server.document().root_group_id();

    let (_, outgoing) = bob.apply_local(|doc, ctx| doc.create_group(ctx, root)).unwrap();
    server.submit(outgoing[0].clone()).unwrap();
    alice
        .apply_local(|doc, ctx| doc.add_vertex(ctx, root, point(2.0, 2.0, 2.0)))
        .unwrap();

    let welcome = server.connect().unwrap();
    alice.resync(&welcome).unwrap();
    assert_eq!(alice.unverified().count(), 0);
    assert_eq!(alice.verified_hash(), server.hash());
    assert!(alice.document().state_eq(server.document()));
}

#[test]
fn test_catch_up_after_missed_broadcast() {
    let mut server = server();
    let mut alice = join(&mut server);
    let mut bob = join(&mut server);
    let root = server.document().root_group_id();

    let mut accepted = Vec::new();
    for x in [0.0, 1.0] {
        let (_, outgoing) = bob
            .apply_local(|doc, ctx| doc.add_vertex(ctx, root, point(x, 0.0, 0.0)))
            .unwrap();
        accepted.push(server.submit(outgoing[0].clone()).unwrap());
    }

    // Alice never saw the first record
    let before = alice.document().hash();
    let err = alice.receive(&accepted[1]).unwrap_err();
    assert!(matches!(err, SyncError::Desync { .. }));
    assert_eq!(alice.document().hash(), before);

    let missing = server.records_since(alice.verified_hash()).unwrap().to_vec();
    assert_eq!(missing.len(), 2);
    alice.catch_up(&missing).unwrap();
    assert_eq!(alice.verified_hash(), server.hash());
    assert!(alice.document().state_eq(server.document()));

    // Late duplicates of applied records are skipped
    alice.receive(&accepted[0]).unwrap();
    alice.receive(&accepted[1]).unwrap();
    assert_eq!(alice.verified_hash(), server.hash());
}

#[tokio::test]
async fn test_server_task_broadcasts_commits() {
    let (handle, task) = spawn_server(server());
    let (alice_welcome, mut alice_updates) = handle.connect().await.unwrap();
    let (bob_welcome, mut bob_updates) = handle.connect().await.unwrap();
    let mut alice = ClientSession::join(&alice_welcome, DocumentConfig::default(), Context::default()).unwrap();
    let mut bob = ClientSession::join(&bob_welcome, DocumentConfig::default(), Context::default()).unwrap();
    let root = alice.document().root_group_id();

    let (face, outgoing) = alice
        .apply_local(|doc, ctx| {
            let corners = [
                point(0.0, 0.0, 0.0),
                point(1.0, 0.0, 0.0),
                point(1.0, 1.0, 0.0),
                point(0.0, 1.0, 0.0),
            ];
            doc.add_face(ctx, root, &corners, None)
        })
        .unwrap();
    for record in outgoing {
        handle.submit(record).await.unwrap();
    }

    alice.receive(&recv_record(&mut alice_updates).await.unwrap()).unwrap();
    bob.receive(&recv_record(&mut bob_updates).await.unwrap()).unwrap();
    assert!(bob.document().get_object(face).is_some());

    let (snapshot, hash) = handle.snapshot().await.unwrap();
    assert_eq!(hash, alice.verified_hash());
    assert_eq!(snapshot, bob.document().to_record());
    assert!(handle.disconnect(bob.user_idx()).await.unwrap());

    drop(handle);
    let server = task.await.unwrap();
    assert_eq!(server.clients().collect::<Vec<_>>(), vec![alice.user_idx()]);
}

#[tokio::test]
async fn test_stale_submission_over_channel() {
    let (handle, _task) = spawn_server(server());
    let (welcome, _updates) = handle.connect().await.unwrap();
    let mut alice = ClientSession::join(&welcome, DocumentConfig::default(), Context::default()).unwrap();
    let root = alice.document().root_group_id();

    let (_, first) = alice.apply_local(|doc, ctx| doc.create_group(ctx, root)).unwrap();
    let (_, second) = alice.apply_local(|doc, ctx| doc.create_group(ctx, root)).unwrap();

    // Submitting out of order breaks the hash chain
    let err = handle.submit(second[0].clone()).await.unwrap_err();
    assert!(matches!(err, SyncError::Desync { .. }));
    alice.handle_rejection(&err).unwrap();
    assert_eq!(alice.document().hash(), welcome.hash);
    assert!(handle.submit(first[0].clone()).await.is_ok());
}

#[tokio::test]
async fn test_recover_replays_missed_records() {
    let (handle, _task) = spawn_server(server());
    let (alice_welcome, mut alice_updates) = handle.connect().await.unwrap();
    let (bob_welcome, _bob_updates) = handle.connect().await.unwrap();
    let mut alice = ClientSession::join(&alice_welcome, DocumentConfig::default(), Context::default()).unwrap();
    let mut bob = ClientSession::join(&bob_welcome, DocumentConfig::default(), Context::default()).unwrap();
    let root = bob.document().root_group_id();

    let (_, first) = bob.apply_local(|doc, ctx| doc.create_group(ctx, root)).unwrap();
    let (_, second) = bob
        .apply_local(|doc, ctx| doc.add_vertex(ctx, root, point(3.0, 0.0, 0.0)))
        .unwrap();
    handle.submit(first[0].clone()).await.unwrap();
    handle.submit(second[0].clone()).await.unwrap();

    // Drop the first broadcast on the floor
    recv_record(&mut alice_updates).await.unwrap();
    let next = recv_record(&mut alice_updates).await.unwrap();
    assert!(matches!(alice.receive(&next), Err(SyncError::Desync { .. })));

    handle.recover(&mut alice).await.unwrap();
    let (snapshot, hash) = handle.snapshot().await.unwrap();
    assert_eq!(alice.verified_hash(), hash);
    assert_eq!(alice.document().to_record(), snapshot);
    assert_eq!(alice.unverified().count(), 0);
}
