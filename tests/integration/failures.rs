use crate::*;
use relay_core::message::NameResponse;
use relay_core::wire;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn bad_magic_closes_only_that_connection() {
    let server = TestServer::start().await;
    let mut bad = TestClient::connect(server.addr).await;
    let mut good = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    let mut frame = wire::encode(&Packet::empty(MessageType::GetTimeRequest));
    frame[4..8].copy_from_slice(&0x0BAD_F00Du32.to_be_bytes());
    bad.writer.write_all(&frame).await.unwrap();

    bad.expect_closed().await;
    server.wait_for_clients(1).await;

    let reply = good.request(&Packet::empty(MessageType::GetNameRequest)).await;
    assert_eq!(reply.parse::<NameResponse>().unwrap().name, SERVER_NAME);

    server.stop().await;
}

#[tokio::test]
async fn oversized_length_prefix_closes_connection() {
    let server = TestServer::start().await;
    let mut client = TestClient::connect(server.addr).await;

    let huge = (wire::MAX_PACKET_SIZE as u32 + 1).to_be_bytes();
    client.writer.write_all(&huge).await.unwrap();

    client.expect_closed().await;
    server.wait_for_clients(0).await;
    server.stop().await;
}

#[tokio::test]
async fn undersized_length_prefix_closes_connection() {
    let server = TestServer::start().await;
    let mut client = TestClient::connect(server.addr).await;

    client.writer.write_all(&4u32.to_be_bytes()).await.unwrap();

    client.expect_closed().await;
    server.wait_for_clients(0).await;
    server.stop().await;
}

#[tokio::test]
async fn unknown_type_gets_notice_and_session_continues() {
    let server = TestServer::start().await;
    let mut client = TestClient::connect(server.addr).await;

    let reply = client
        .request(&Packet::new(MessageType::Other(0x7f), &b"{}"[..]))
        .await;
    assert_eq!(reply.msg_type, MessageType::SystemNoticeIndication);
    let notice: SystemNotice = reply.parse().unwrap();
    assert_eq!(notice.message, relayd::dispatch::UNHANDLED_NOTICE);

    // A response type sent as a request is just as unhandled.
    let reply = client.request(&Packet::empty(MessageType::GetTimeResponse)).await;
    assert_eq!(reply.msg_type, MessageType::SystemNoticeIndication);

    let reply = client.request(&Packet::empty(MessageType::GetNameRequest)).await;
    assert_eq!(reply.msg_type, MessageType::GetNameResponse);

    server.stop().await;
}

#[tokio::test]
async fn abrupt_disconnect_is_cleaned_up() {
    let server = TestServer::start().await;
    let client = TestClient::connect(server.addr).await;
    server.wait_for_clients(1).await;

    drop(client);
    server.wait_for_clients(0).await;

    // Ids are not reused after the drop.
    let next = TestClient::connect(server.addr).await;
    assert!(next.id > 1);
    server.stop().await;
}
