use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpListener;

use venti_client::{Client, ClientError, Server};
use venti_core::testutil::MemStore;
use venti_core::{BlockType, Score, SourceReader, SourceWriter};

/// Binds a server on an ephemeral port and returns its address.
async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server = Server::new(MemStore::new());
    tokio::spawn(server.listen(listener));
    addr.to_string()
}

#[tokio::test]
async fn dial_negotiates_a_session() {
    let addr = start_server().await;
    let client = Client::dial(&addr).await.expect("dial");
    assert_eq!(client.version(), "02");
    assert!(!client.sid().is_empty());
    client.close().await.expect("close");
}

#[tokio::test]
async fn read_write_roundtrip() {
    let addr = start_server().await;
    let client = Client::dial(&addr).await.expect("dial");

    let block = Bytes::from_static(b"the quick brown fox jumps over the lazy dog.");
    let want = Score::fingerprint(&block);

    let score = client
        .write_block(BlockType::DATA, block.clone())
        .await
        .expect("write block");
    assert_eq!(score, want);

    let got = client
        .read_block(score, BlockType::DATA, block.len())
        .await
        .expect("read block");
    assert_eq!(got, block);

    // short reads return a prefix
    let head = client
        .read_block(score, BlockType::DATA, 9)
        .await
        .expect("short read");
    assert_eq!(&head[..], &block[..9]);

    client.close().await.expect("close");
}

#[tokio::test]
async fn unknown_score_is_a_server_error() {
    let addr = start_server().await;
    let client = Client::dial(&addr).await.expect("dial");

    let missing = Score::fingerprint(b"does not exist in venti");
    match client.read_block(missing, BlockType::DATA, 64).await {
        Err(ClientError::Rpc(venti_rpc::RpcError::Server(_))) => {}
        other => panic!("unexpected: {other:?}"),
    }

    // the connection survives a server error
    client.ping().await.expect("ping");
    client.close().await.expect("close");
}

/// An unrecognized request func gets an error reply rather than silence.
#[tokio::test]
async fn unknown_func_is_a_server_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Bogus;
    impl venti_rpc::Call for Bogus {
        const FUNC: u8 = 0;
        type Reply = ();
        fn encode(&self, _buf: &mut bytes::BytesMut) -> Result<(), venti_rpc::RpcError> {
            Ok(())
        }
    }

    let addr = start_server().await;
    let mut stream = tokio::net::TcpStream::connect(&addr).await.expect("connect");
    stream
        .write_all(b"venti-02-bogus-test\n")
        .await
        .expect("greeting");
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await.expect("server greeting");
        if byte[0] == b'\n' {
            break;
        }
    }

    let (r, w) = stream.into_split();
    let rpc = venti_rpc::RpcClient::new(r, w);
    match rpc.call(&Bogus).await {
        Err(venti_rpc::RpcError::Server(msg)) => assert!(msg.contains("unknown rpc")),
        other => panic!("unexpected: {other:?}"),
    }
    rpc.shutdown();
}

#[tokio::test]
async fn boundary_cases_stay_local() {
    let addr = start_server().await;
    let client = Client::dial(&addr).await.expect("dial");

    // empty write: zero score, no call
    let score = client
        .write_block(BlockType::DATA, Bytes::new())
        .await
        .expect("empty write");
    assert!(score.is_zero());

    // zero-score read: empty, no call
    let data = client
        .read_block(Score::ZERO, BlockType::DATA, 100)
        .await
        .expect("zero read");
    assert!(data.is_empty());

    // buffers past the u16 limit are rejected before hitting the wire
    match client
        .read_block(Score::fingerprint(b"x"), BlockType::DATA, 70_000)
        .await
    {
        Err(ClientError::OversizedBuffer(70_000)) => {}
        other => panic!("unexpected: {other:?}"),
    }
    match client
        .write_block(BlockType::DATA, Bytes::from(vec![0x7u8; 70_000]))
        .await
    {
        Err(ClientError::OversizedBuffer(70_000)) => {}
        other => panic!("unexpected: {other:?}"),
    }

    client.close().await.expect("close");
}

/// Many tasks hammering one client: tags must never collide and every
/// call must complete.
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_pings() {
    let addr = start_server().await;
    let client = Arc::new(Client::dial(&addr).await.expect("dial"));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..1000 {
                client.ping().await.expect("ping");
            }
        }));
    }
    for t in tasks {
        t.await.expect("ping task");
    }
    client.close().await.expect("close");
}

/// The client is a block store: the whole source layer runs over it.
#[tokio::test]
async fn source_tree_over_the_wire() {
    let addr = start_server().await;
    let client = Arc::new(Client::dial(&addr).await.expect("dial"));

    let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let mut w =
        SourceWriter::new(client.clone(), BlockType::DATA, 3 * 20, 20).expect("writer");
    w.write(&data).await.expect("write");
    let entry = w.flush().await.expect("flush");
    assert_eq!(entry.size, data.len() as u64);

    let mut r = SourceReader::new(client.clone(), entry).expect("reader");
    let got = r.read_to_vec().await.expect("read back");
    assert_eq!(got, data);

    client.close().await.expect("close");
}
