//! Integration coverage for the handshake and message framer (§8, S5-S6)
//! over a real loopback TCP connection rather than an in-memory buffer,
//! since the framer's public contract is defined in terms of a
//! `TcpStream`.
use bytes::{Bytes, BytesMut};
use rs_torrent_client::peer::{Handshake, Message, MessageId};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

async fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connect = TcpStream::connect(addr);
    let accept = listener.accept();
    let (client, (server, _)) = tokio::join!(connect, accept);
    (client.unwrap(), server)
}

#[tokio::test]
async fn handshake_round_trips_over_loopback() {
    let (mut client, mut server) = loopback_pair().await;
    let info_hash = [7u8; 20];
    let client_peer_id = [1u8; 20];
    let server_peer_id = [2u8; 20];

    let server_task = tokio::spawn(async move {
        // Emulates a remote peer: reads the client's handshake bytes,
        // validates nothing (a real peer would check its own info_hash
        // set), and writes its own handshake back.
        let mut buf = [0u8; 68];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(buf[0], 19);
        assert_eq!(&buf[28..48], &info_hash);
        assert_eq!(&buf[48..68], &client_peer_id);

        let reply = Handshake::new(info_hash, server_peer_id);
        server.write_all(&reply.serialize()).await.unwrap();
    });

    let theirs = Handshake::perform(&mut client, info_hash, client_peer_id)
        .await
        .unwrap();
    assert_eq!(theirs.peer_id, server_peer_id);
    assert_eq!(theirs.info_hash, info_hash);

    server_task.await.unwrap();
}

#[tokio::test]
async fn handshake_rejects_mismatched_info_hash() {
    let (mut client, mut server) = loopback_pair().await;
    let server_task = tokio::spawn(async move {
        let mut buf = [0u8; 68];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf)
            .await
            .unwrap();
        let reply = Handshake::new([9u8; 20], [2u8; 20]); // wrong info_hash
        server.write_all(&reply.serialize()).await.unwrap();
    });

    let result = Handshake::perform(&mut client, [7u8; 20], [1u8; 20]).await;
    assert!(result.is_err());
    server_task.await.unwrap();
}

#[tokio::test]
async fn message_framer_round_trips_bitfield_and_keep_alive() {
    let (mut client, mut server) = loopback_pair().await;

    let server_task = tokio::spawn(async move {
        let msg = Message::new(MessageId::Bitfield, Bytes::from_static(&[0b1010_0000]));
        Message::write(&mut server, Some(&msg)).await.unwrap();
        Message::write(&mut server, None).await.unwrap(); // keep-alive
    });

    let first = Message::read(&mut client).await.unwrap().unwrap();
    assert_eq!(first.id, MessageId::Bitfield);
    assert_eq!(&first.payload[..], &[0b1010_0000]);

    let second = Message::read(&mut client).await.unwrap();
    assert!(second.is_none(), "zero-length frame must decode as keep-alive");

    server_task.await.unwrap();
}

#[tokio::test]
async fn message_framer_round_trips_request_and_piece() {
    let (mut client, mut server) = loopback_pair().await;

    let server_task = tokio::spawn(async move {
        let req = Message::read(&mut server).await.unwrap().unwrap();
        assert_eq!(req.id, MessageId::Request);
        assert_eq!(req.payload.len(), 12);

        let mut payload = BytesMut::new();
        payload.extend_from_slice(&1u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(b"hello world piece bytes");
        let piece = Message::new(MessageId::Piece, payload.freeze());
        Message::write(&mut server, Some(&piece)).await.unwrap();
    });

    let request = Message::request(1, 0, 16384);
    Message::write(&mut client, Some(&request)).await.unwrap();

    let reply = Message::read(&mut client).await.unwrap().unwrap();
    assert_eq!(reply.id, MessageId::Piece);
    assert_eq!(&reply.payload[8..], b"hello world piece bytes");

    server_task.await.unwrap();
}
