use crate::*;
use relay_core::message::{ClientListResponse, NameResponse, ServerShutdownIndication, TimeResponse};

#[tokio::test]
async fn ids_increase_per_connection() {
    let server = TestServer::start().await;
    let a = TestClient::connect(server.addr).await;
    let b = TestClient::connect(server.addr).await;
    let c = TestClient::connect(server.addr).await;

    assert!(a.id >= 1);
    assert!(a.id < b.id && b.id < c.id);
    server.wait_for_clients(3).await;

    drop((a, b, c));
    server.wait_for_clients(0).await;
    server.stop().await;
}

#[tokio::test]
async fn time_and_name_queries() {
    let server = TestServer::start().await;
    let mut client = TestClient::connect(server.addr).await;

    let reply = client.request(&Packet::empty(MessageType::GetTimeRequest)).await;
    assert_eq!(reply.msg_type, MessageType::GetTimeResponse);
    let time: TimeResponse = reply.parse().unwrap();
    assert!(time.time.ends_with(" UTC"), "unexpected time: {}", time.time);

    let reply = client.request(&Packet::empty(MessageType::GetNameRequest)).await;
    assert_eq!(reply.msg_type, MessageType::GetNameResponse);
    assert_eq!(reply.parse::<NameResponse>().unwrap().name, SERVER_NAME);

    server.stop().await;
}

#[tokio::test]
async fn client_list_shows_every_session() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let b = TestClient::connect(server.addr).await;

    let reply = a.request(&Packet::empty(MessageType::GetClientListRequest)).await;
    assert_eq!(reply.msg_type, MessageType::GetClientListResponse);
    let list: ClientListResponse = reply.parse().unwrap();

    let ids: Vec<_> = list.clients.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);
    assert!(list.clients.iter().all(|c| c.address == "127.0.0.1" && c.port != 0));

    server.stop().await;
}

#[tokio::test]
async fn disconnect_removes_the_session() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    a.send(&Packet::empty(MessageType::DisconnectRequest)).await;
    a.expect_closed().await;
    server.wait_for_clients(1).await;
    assert!(server.registry.lookup(a.id).is_none());

    let list: ClientListResponse = b
        .request(&Packet::empty(MessageType::GetClientListRequest))
        .await
        .parse()
        .unwrap();
    assert_eq!(list.clients.len(), 1);
    assert_eq!(list.clients[0].id, b.id);

    server.stop().await;
}

#[tokio::test]
async fn shutdown_is_announced_to_every_client() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;
    let registry = server.registry.clone();
    let addr = server.addr;

    server.stop().await;

    for client in [&mut a, &mut b] {
        let packet = client.recv().await;
        assert_eq!(packet.msg_type, MessageType::ServerShutdownIndication);
        let ind: ServerShutdownIndication = packet.parse().unwrap();
        assert!(!ind.reason.is_empty());
        client.expect_closed().await;
    }
    assert!(registry.is_empty());

    // The listener is gone.
    assert!(TcpStream::connect(addr).await.is_err());
}
