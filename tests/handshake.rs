//! End-to-end handshake, message exchange, and finish, against a hand-rolled
//! fake server speaking raw LIME JSON over a loopback TCP socket.

use std::sync::Arc;
use std::time::Duration;

use lime::envelope::{AuthenticationScheme, Compression, Encryption, Envelope, Message, Session, SessionState};
use lime::node::Node;
use lime::trace::NullTraceWriter;
use lime::transport::framing::FrameBuffer;
use lime::{wire, ClientSession, Credentials};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn recv_envelope(stream: &mut TcpStream, buffer: &mut FrameBuffer) -> Envelope {
    loop {
        buffer.compact_or_overflow().unwrap();
        let n = stream.read(buffer.write_slice()).await.unwrap();
        assert!(n > 0, "peer closed before sending a whole envelope");
        buffer.commit(n);
        if let Some(bytes) = buffer.next_envelope().unwrap() {
            return wire::deserialize(&bytes).unwrap();
        }
    }
}

async fn send_envelope(stream: &mut TcpStream, envelope: &Envelope) {
    let json = wire::serialize(envelope).unwrap();
    stream.write_all(json.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

fn expect_session(envelope: Envelope) -> Session {
    match envelope {
        Envelope::Session(s) => s,
        other => panic!("expected a session envelope, got {:?}", other),
    }
}

#[tokio::test]
async fn full_handshake_message_and_finish() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buffer = FrameBuffer::new(8192);
        let server_node: Node = "server@lime.test".parse().unwrap();

        let new_session = expect_session(recv_envelope(&mut stream, &mut buffer).await);
        assert_eq!(new_session.state, SessionState::New);
        assert_eq!(new_session.shared.from, Some("alice@lime.test".parse().unwrap()));

        let mut negotiating = Session::new(SessionState::Negotiating);
        negotiating.shared.id = Some("sess-1".to_string());
        negotiating.shared.from = Some(server_node.clone());
        negotiating.encryption_options = Some(vec![Encryption::None]);
        negotiating.compression_options = Some(vec![Compression::None]);
        send_envelope(&mut stream, &Envelope::Session(negotiating)).await;

        let negotiate = expect_session(recv_envelope(&mut stream, &mut buffer).await);
        assert_eq!(negotiate.state, SessionState::Negotiating);
        assert_eq!(negotiate.encryption, Some(Encryption::None));
        assert_eq!(negotiate.compression, Some(Compression::None));
        assert_eq!(negotiate.shared.id, Some("sess-1".to_string()));

        let mut authenticating = Session::new(SessionState::Authenticating);
        authenticating.shared.id = Some("sess-1".to_string());
        authenticating.scheme_options = Some(vec![AuthenticationScheme::Guest]);
        send_envelope(&mut stream, &Envelope::Session(authenticating)).await;

        let authenticate = expect_session(recv_envelope(&mut stream, &mut buffer).await);
        assert_eq!(authenticate.state, SessionState::Authenticating);
        assert_eq!(authenticate.scheme, Some(AuthenticationScheme::Guest));
        assert_eq!(authenticate.shared.id, Some("sess-1".to_string()));

        let mut established = Session::new(SessionState::Established);
        established.shared.id = Some("sess-1".to_string());
        established.shared.from = Some(server_node.clone());
        send_envelope(&mut stream, &Envelope::Session(established)).await;

        let message = match recv_envelope(&mut stream, &mut buffer).await {
            Envelope::Message(m) => m,
            other => panic!("expected a message envelope, got {:?}", other),
        };
        assert_eq!(message.content, serde_json::json!("hello"));

        let finishing = expect_session(recv_envelope(&mut stream, &mut buffer).await);
        assert_eq!(finishing.state, SessionState::Finishing);
        assert_eq!(finishing.shared.id, Some("sess-1".to_string()));

        let mut finished = Session::new(SessionState::Finished);
        finished.shared.id = Some("sess-1".to_string());
        send_envelope(&mut stream, &Envelope::Session(finished)).await;
    });

    let client_identity: Node = "alice@lime.test".parse().unwrap();
    let session = ClientSession::new(Arc::new(NullTraceWriter));
    session
        .establish_session(
            &format!("net.tcp://{}:{}", addr.ip(), addr.port()),
            &client_identity,
            Credentials::Guest,
            Duration::from_secs(2),
        )
        .await
        .expect("handshake should succeed");

    assert_eq!(session.state(), SessionState::Established);
    assert_eq!(session.channel().session_id(), Some("sess-1".to_string()));

    let message = Message::new(serde_json::json!("hello"));
    session
        .channel()
        .send_message(message)
        .await
        .expect("send should succeed");

    session
        .finish_session(Duration::from_secs(2))
        .await
        .expect("finish should succeed");

    server.await.unwrap();
}

#[tokio::test]
async fn failed_authentication_surfaces_reason() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buffer = FrameBuffer::new(8192);

        let _new_session = expect_session(recv_envelope(&mut stream, &mut buffer).await);

        // Skip straight to authenticating; no negotiation offered.
        let mut authenticating = Session::new(SessionState::Authenticating);
        authenticating.shared.id = Some("sess-2".to_string());
        send_envelope(&mut stream, &Envelope::Session(authenticating)).await;

        let _authenticate = expect_session(recv_envelope(&mut stream, &mut buffer).await);
        let mut failed = Session::new(SessionState::Failed);
        failed.shared.id = Some("sess-2".to_string());
        failed.reason = Some(lime::envelope::Reason {
            code: 1,
            description: "invalid credentials".to_string(),
        });
        send_envelope(&mut stream, &Envelope::Session(failed)).await;
    });

    let identity: Node = "alice@lime.test".parse().unwrap();
    let session = ClientSession::new(Arc::new(NullTraceWriter));
    let result = session
        .establish_session(
            &format!("net.tcp://{}:{}", addr.ip(), addr.port()),
            &identity,
            Credentials::Plain {
                password: "wrong".to_string(),
            },
            Duration::from_secs(2),
        )
        .await;

    let error = result.expect_err("authentication should fail");
    assert!(error.to_string().contains("invalid credentials"));
    assert_eq!(session.state(), SessionState::Failed);

    server.await.unwrap();
}
