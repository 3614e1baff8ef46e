//! Integration tests for camwire.
//!
//! These tests verify the producer pipeline against a plain TCP listener
//! standing in for the relay.

use std::time::Duration;

use camwire::protocol::{build_envelope, EnvelopeBuffer, HEADER_SIZE, MAGIC};
use camwire::writer::write_envelope;
use camwire::{
    CamwireError, CaptureOutcome, ConnectionState, EnqueueOutcome, Frame, FrameQueue,
    FrameTransport, Producer, SendOutcome,
};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Read from `stream` until `count` envelopes have been parsed.
async fn read_payloads(stream: &mut TcpStream, count: usize) -> Vec<Vec<u8>> {
    let mut buffer = EnvelopeBuffer::new();
    let mut payloads = Vec::new();
    let mut chunk = [0u8; 4096];

    while payloads.len() < count {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .expect("timed out waiting for envelopes")
            .unwrap();
        assert!(n > 0, "peer closed after {} envelopes", payloads.len());
        for envelope in buffer.push(&chunk[..n]).unwrap() {
            payloads.push(envelope.payload().to_vec());
        }
    }
    payloads
}

/// The literal example from the wire format description.
#[test]
fn test_abc_envelope_bytes() {
    assert_eq!(
        build_envelope(b"abc"),
        vec![0xFE, 0xED, 0x00, 0x00, 0x00, 0x03, b'a', b'b', b'c']
    );
    assert_eq!(MAGIC, 0xFEED);
    assert_eq!(HEADER_SIZE, 6);
}

/// Two envelopes back to back in one chunk come out of a single push.
#[test]
fn test_two_envelopes_one_chunk() {
    let mut chunk = build_envelope(b"hdr1-payload");
    chunk.extend(build_envelope(b"hdr2-payload"));

    let mut buffer = EnvelopeBuffer::new();
    let envelopes = buffer.push(&chunk).unwrap();

    assert_eq!(envelopes.len(), 2);
    assert_eq!(envelopes[0].payload(), b"hdr1-payload");
    assert_eq!(envelopes[1].payload(), b"hdr2-payload");
    assert!(buffer.is_empty());
}

/// Fragmented delivery byte by byte.
#[test]
fn test_fragmented_envelope_parsing() {
    let jpeg: Vec<u8> = (0..200u8).collect();
    let wire = build_envelope(&jpeg);

    let mut buffer = EnvelopeBuffer::new();
    let mut out = Vec::new();
    for byte in &wire {
        out.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
    }

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].payload(), &jpeg[..]);
}

/// Bad magic after a valid envelope: the valid one is kept, then the error.
#[test]
fn test_bad_magic_after_valid_envelope() {
    let mut wire = build_envelope(b"good");
    wire.extend_from_slice(&[0x12, 0x34, 0, 0, 0, 0]);

    let mut buffer = EnvelopeBuffer::new();
    buffer.extend(&wire);
    assert_eq!(buffer.next_envelope().unwrap().unwrap().payload(), b"good");
    let err = buffer.next_envelope().unwrap_err();
    assert!(matches!(err, CamwireError::BadMagic(0x1234)));
    assert!(err.is_protocol_violation());
}

#[tokio::test]
async fn test_writer_over_tcp() {
    let (listener, port) = listener().await;
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();

    for i in 0..20u16 {
        write_envelope(&mut client, &i.to_be_bytes()).await.unwrap();
    }

    let payloads = read_payloads(&mut server, 20).await;
    for (i, payload) in payloads.iter().enumerate() {
        assert_eq!(payload, &(i as u16).to_be_bytes());
    }
}

/// Drop-oldest keeps the newest frames when the consumer is slow.
#[tokio::test]
async fn test_queue_keeps_newest_frames() {
    let queue = FrameQueue::new();
    let outcomes: Vec<EnqueueOutcome> = (0..5)
        .map(|i| queue.enqueue(Frame::new(vec![i as u8], 1, 1, i)))
        .collect();

    assert_eq!(outcomes[0], EnqueueOutcome::Queued);
    assert_eq!(outcomes[1], EnqueueOutcome::Queued);
    assert!(outcomes[2..].iter().all(|o| *o == EnqueueOutcome::DroppedOldest));
    assert_eq!(queue.len(), 2);

    queue.close();
    assert_eq!(queue.dequeue().await.unwrap().captured_at_millis, 3);
    assert_eq!(queue.dequeue().await.unwrap().captured_at_millis, 4);
    assert!(queue.dequeue().await.is_none());
}

#[tokio::test]
async fn test_transport_rejects_privileged_port() {
    let transport = FrameTransport::new();
    assert!(transport.connect(80).await.is_err());
    assert_eq!(transport.state(), ConnectionState::Error);
    assert_eq!(transport.send(b"abc").await, SendOutcome::Skipped);
}

#[tokio::test]
async fn test_transport_state_sequence() {
    let (listener, port) = listener().await;
    let transport = FrameTransport::new();
    let mut states = transport.subscribe();

    transport.connect(port).await.unwrap();
    let _server = listener.accept().await.unwrap();
    transport.connect(port).await.unwrap();
    transport.disconnect().await;
    transport.disconnect().await;

    let mut seen = Vec::new();
    while let Ok(state) = states.try_recv() {
        seen.push(state);
    }
    assert_eq!(
        seen,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
}

/// Concurrent sends and a disconnect never produce a torn envelope.
#[tokio::test]
async fn test_concurrent_send_and_disconnect() {
    let (listener, port) = listener().await;
    let transport = std::sync::Arc::new(FrameTransport::new());
    transport.connect(port).await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();

    let payload = vec![0xAB; 32 * 1024];
    let mut senders = Vec::new();
    for _ in 0..4 {
        let transport = transport.clone();
        let payload = payload.clone();
        senders.push(tokio::spawn(async move {
            for _ in 0..20 {
                transport.send(&payload).await;
            }
        }));
    }
    let reader = tokio::spawn(async move {
        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        wire
    });

    tokio::time::sleep(Duration::from_millis(5)).await;
    transport.disconnect().await;
    for sender in senders {
        sender.await.unwrap();
    }

    let wire = reader.await.unwrap();
    let envelopes = EnvelopeBuffer::new().push(&wire).unwrap();
    assert_eq!(envelopes.len() as u64, transport.frames_sent());
    assert!(envelopes.iter().all(|e| e.payload() == &payload[..]));
}

#[tokio::test]
async fn test_producer_end_to_end() {
    let (listener, port) = listener().await;
    let producer = Producer::builder().queue_capacity(16).start();

    assert_eq!(
        producer.on_frame_captured(&b"too early"[..], 1, 1),
        CaptureOutcome::Skipped
    );

    producer.connect(port).await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();

    for i in 0..8u8 {
        producer.on_frame_captured(vec![i; 100], 640, 480);
    }
    let payloads = read_payloads(&mut server, 8).await;
    for (i, payload) in payloads.iter().enumerate() {
        assert_eq!(payload, &vec![i as u8; 100]);
    }

    producer.shutdown().await;
    assert_eq!(producer.state(), ConnectionState::Disconnected);
    assert_eq!(producer.frames_sent(), 8);
}
