use crate::*;
use relay_core::message::{
    DeliveryStatus, MessageIndication, MessageResponse, SendMessageRequest, TimeResponse,
};
use relay_core::wire;

fn send_message(target_id: ClientId, message: &str) -> Packet {
    Packet::json(
        MessageType::SendMessageRequest,
        &SendMessageRequest {
            target_id,
            message: message.into(),
        },
    )
}

#[tokio::test]
async fn message_is_routed_to_target_only() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    let mut c = TestClient::connect(server.addr).await;

    a.send(&send_message(b.id, "hello b")).await;

    let ind = b.recv().await;
    assert_eq!(ind.msg_type, MessageType::MessageIndication);
    assert_eq!(
        ind.parse::<MessageIndication>().unwrap(),
        MessageIndication {
            sender_id: a.id,
            message: "hello b".into()
        }
    );

    let resp = a.recv().await;
    assert_eq!(resp.msg_type, MessageType::SendMessageResponse);
    let resp: MessageResponse = resp.parse().unwrap();
    assert_eq!(resp.target_id, b.id);
    assert_eq!(resp.status, DeliveryStatus::Success);

    c.expect_silence(Duration::from_millis(200)).await;
    server.stop().await;
}

#[tokio::test]
async fn unknown_target_is_an_error_and_nothing_is_delivered() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;

    let resp = a.request(&send_message(9_999, "anyone?")).await;
    assert_eq!(resp.msg_type, MessageType::SendMessageResponse);
    let resp: MessageResponse = resp.parse().unwrap();
    assert_eq!(resp.target_id, 9_999);
    assert!(matches!(resp.status, DeliveryStatus::Error { .. }));

    b.expect_silence(Duration::from_millis(200)).await;
    server.stop().await;
}

#[tokio::test]
async fn conversation_keeps_order() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;

    for i in 0..20 {
        a.send(&send_message(b.id, &format!("m{i}"))).await;
    }
    for i in 0..20 {
        let ind: MessageIndication = b.recv().await.parse().unwrap();
        assert_eq!(ind.message, format!("m{i}"));
    }
    for _ in 0..20 {
        let resp: MessageResponse = a.recv().await.parse().unwrap();
        assert_eq!(resp.status, DeliveryStatus::Success);
    }

    server.stop().await;
}

#[tokio::test]
async fn malformed_request_is_answered_and_session_survives() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;

    let resp = a
        .request(&Packet::new(
            MessageType::SendMessageRequest,
            &br#"{"target_id":"nope"}"#[..],
        ))
        .await;
    assert_eq!(resp.msg_type, MessageType::SendMessageResponse);
    let resp: MessageResponse = resp.parse().unwrap();
    assert!(matches!(resp.status, DeliveryStatus::Error { .. }));

    let time = a.request(&Packet::empty(MessageType::GetTimeRequest)).await;
    assert!(time.parse::<TimeResponse>().is_ok());

    server.stop().await;
}

#[tokio::test]
async fn relay_never_exceeds_the_frame_limit() {
    let server = TestServer::start().await;
    let mut clients = Vec::new();
    for _ in 0..10 {
        clients.push(TestClient::connect(server.addr).await);
    }
    let mut target = clients.remove(8);
    let mut sender = clients.pop().expect("ten clients");
    assert_eq!((sender.id, target.id), (10, 9));

    // Request exactly at the limit; the indication would carry "10" where
    // the request carried "9".
    let overhead = send_message(target.id, "").content.len();
    let text = "a".repeat(wire::MAX_PACKET_SIZE - wire::HEADER_SIZE - overhead);
    let request = send_message(target.id, &text);
    assert_eq!(wire::HEADER_SIZE + request.content.len(), wire::MAX_PACKET_SIZE);

    let resp: MessageResponse = sender.request(&request).await.parse().unwrap();
    assert_eq!(resp.target_id, target.id);
    assert!(matches!(resp.status, DeliveryStatus::Error { .. }));

    // The target got nothing and is still connected.
    target.expect_silence(Duration::from_millis(200)).await;
    let reply = target.request(&Packet::empty(MessageType::GetTimeRequest)).await;
    assert!(reply.parse::<TimeResponse>().is_ok());

    server.stop().await;
}
