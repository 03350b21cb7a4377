use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::*;
use relay_cli::commands::send_file;
use relay_cli::{Pipeline, Presenter};
use relay_core::message::{DeliveryStatus, FileResponse};
use relay_services::{FileReassembler, MAX_CHUNK_SIZE};

/// Presenter output the test can inspect.
#[derive(Clone, Default)]
struct Screen(Arc<Mutex<Vec<u8>>>);

impl Write for Screen {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Screen {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn file_is_relayed_and_reassembled() {
    let server = TestServer::start().await;
    let mut sender = TestClient::connect(server.addr).await;

    // Receiver runs the real client pipeline.
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    let receiver_id = read_welcome(&mut reader).await;
    let downloads = temp_dir("downloads");
    let screen = Screen::default();
    let pipeline = Pipeline::spawn(
        reader,
        Presenter::new(screen.clone(), FileReassembler::new(downloads.clone())),
    );

    let src_dir = temp_dir("src");
    std::fs::create_dir_all(&src_dir).unwrap();
    let src = src_dir.join("payload.bin");
    let data: Vec<u8> = (0..MAX_CHUNK_SIZE * 2 + 123).map(|i| (i % 253) as u8).collect();
    std::fs::write(&src, &data).unwrap();

    let sent = send_file(&mut sender.writer, &src, receiver_id, Duration::from_millis(1))
        .await
        .unwrap();
    assert_eq!(sent, 4); // 3 data chunks + eof

    // Exactly one acknowledgement, for the final chunk.
    let ack = sender.recv().await;
    assert_eq!(ack.msg_type, MessageType::SendFileResponse);
    let ack: FileResponse = ack.parse().unwrap();
    assert_eq!(ack.filename, "payload.bin");
    assert_eq!(ack.status, DeliveryStatus::Success);
    sender.expect_silence(Duration::from_millis(200)).await;

    // The indication for the eof chunk was written before the ack, so the
    // receiver has it; wait for the presenter to finish the file.
    let expected = downloads.join(format!("{}_payload.bin", sender.id));
    let deadline = tokio::time::Instant::now() + WAIT;
    while !screen.text().contains("[File received]") {
        assert!(tokio::time::Instant::now() < deadline, "file never completed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(std::fs::read(&expected).unwrap(), data);

    pipeline.shutdown(&mut writer).await;
    server.stop().await;
    let _ = std::fs::remove_dir_all(&downloads);
    let _ = std::fs::remove_dir_all(&src_dir);
}

#[tokio::test]
async fn file_to_missing_target_is_refused() {
    let server = TestServer::start().await;
    let mut sender = TestClient::connect(server.addr).await;

    let src_dir = temp_dir("refused");
    std::fs::create_dir_all(&src_dir).unwrap();
    let src = src_dir.join("note.txt");
    std::fs::write(&src, b"nobody home").unwrap();

    let sent = send_file(&mut sender.writer, &src, 4_242, Duration::ZERO)
        .await
        .unwrap();

    // Every chunk is refused.
    for _ in 0..sent {
        let resp: FileResponse = sender.recv().await.parse().unwrap();
        assert_eq!(resp.target_id, 4_242);
        assert_eq!(resp.filename, "note.txt");
        assert!(matches!(resp.status, DeliveryStatus::Error { .. }));
    }

    server.stop().await;
    let _ = std::fs::remove_dir_all(&src_dir);
}

#[tokio::test]
async fn pipeline_reports_server_shutdown() {
    let server = TestServer::start().await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    read_welcome(&mut reader).await;

    let screen = Screen::default();
    let pipeline = Pipeline::spawn(
        reader,
        Presenter::new(screen.clone(), FileReassembler::new(temp_dir("unused"))),
    );
    let mut running = pipeline.subscribe();

    server.stop().await;

    // Indication is presented, then the closed connection stops the receiver.
    tokio::time::timeout(WAIT, running.wait_for(|running| !running))
        .await
        .expect("receiver should stop when the server goes away")
        .unwrap();
    pipeline.shutdown(&mut writer).await;
    assert!(screen.text().starts_with("[Server shutdown]"));
}
