use std::sync::Arc;

use venti_core::testutil::MemStore;
use venti_core::{BlockType, Score, SourceReader, SourceWriter};

fn store() -> Arc<MemStore> {
    Arc::new(MemStore::new())
}

async fn roundtrip(store: &Arc<MemStore>, data: &[u8], psize: u32, dsize: u32) -> venti_core::Entry {
    let mut w = SourceWriter::new(store.clone(), BlockType::DATA, psize, dsize).expect("writer");
    w.write(data).await.expect("write");
    let e = w.flush().await.expect("flush");
    assert_eq!(e.size, data.len() as u64, "entry size");

    let mut r = SourceReader::new(store.clone(), e).expect("reader");
    let got = r.read_to_vec().await.expect("read back");
    assert_eq!(got, data, "roundtrip");
    e
}

/// A single small write stays a single data block at depth zero, and the
/// entry score is the plain fingerprint of the data.
#[tokio::test]
async fn single_block_source() {
    let store = store();
    let e = roundtrip(&store, b"foobar", 60, 20).await;
    assert_eq!(e.depth(), 0);
    assert_eq!(e.size, 6);
    assert_eq!(e.score, Score::fingerprint(b"foobar"));
}

/// Two leaves need one pointer block above them.
#[tokio::test]
async fn two_blocks_one_pointer() {
    let store = store();
    let data = b"this is 2 blocks and 1 pointer";
    assert_eq!(data.len(), 30);
    let e = roundtrip(&store, data, 60, 20).await;
    assert_eq!(e.depth(), 1);
}

/// Five leaves with a fan-out of three make two pointer blocks and a
/// depth-two root.
#[tokio::test]
async fn five_blocks_two_levels() {
    let store = store();
    let data = [0x42u8; 83];
    let e = roundtrip(&store, &data, 60, 20).await;
    assert_eq!(e.depth(), 2);
}

/// Streams whose blocks end in zeros are stored zero-truncated but read
/// back intact; size is the authority.
#[tokio::test]
async fn zero_tails_survive_roundtrip() {
    let store = store();

    // zeros inside a block, at block boundaries, and at the very end
    let mut data = vec![0u8; 100];
    data[0] = b'a';
    data[25] = b'b';
    roundtrip(&store, &data, 60, 20).await;

    // fully zero stream
    let zeros = vec![0u8; 70];
    let e = roundtrip(&store, &zeros, 60, 20).await;
    assert_eq!(e.size, 70);

    // zero tail long enough to truncate trailing pointer scores
    let mut data = vec![0u8; 200];
    data[0] = b'x';
    roundtrip(&store, &data, 60, 20).await;
}

/// Flushing an unwritten source yields the canonical empty entry.
#[tokio::test]
async fn empty_source() {
    let store = store();
    let mut w = SourceWriter::new(store.clone(), BlockType::DATA, 60, 20).expect("writer");
    let e = w.flush().await.expect("flush");
    assert_eq!(e.size, 0);
    assert_eq!(e.depth(), 0);
    assert!(e.score.is_zero());

    let mut r = SourceReader::new(store.clone(), e).expect("reader");
    assert!(r.next_block().await.expect("next").is_none());
}

/// Identical content produces identical roots regardless of how the
/// writer's input is chunked, and the writer is reusable after a flush.
#[tokio::test]
async fn chunking_does_not_change_the_root() {
    let store = store();
    let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 + 3) as u8).collect();

    let mut w = SourceWriter::new(store.clone(), BlockType::DATA, 60, 20).expect("writer");
    w.write(&data).await.expect("write");
    let whole = w.flush().await.expect("flush");

    // same writer, byte-at-a-time
    for b in &data {
        w.write(std::slice::from_ref(b)).await.expect("write");
    }
    let tiny = w.flush().await.expect("flush");

    assert_eq!(whole, tiny);
}

/// A larger stream across several pointer levels.
#[tokio::test]
async fn deep_tree_roundtrip() {
    let store = store();
    let mut x = 0x2545f491u32;
    let data: Vec<u8> = (0..40_000)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect();
    let e = roundtrip(&store, &data, 60, 20).await;
    // 2000 leaves at fan-out 3
    assert_eq!(e.depth(), 7);
}

/// read() hands out partial copies across block boundaries.
#[tokio::test]
async fn partial_reads() {
    let store = store();
    let data = b"this is 2 blocks and 1 pointer";
    let mut w = SourceWriter::new(store.clone(), BlockType::DATA, 60, 20).expect("writer");
    w.write(data).await.expect("write");
    let e = w.flush().await.expect("flush");

    let mut r = SourceReader::new(store.clone(), e).expect("reader");
    let mut out = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        let n = r.read(&mut buf).await.expect("read");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
}

/// write_to drains into any AsyncWrite sink.
#[tokio::test]
async fn write_to_sink() {
    let store = store();
    let data = vec![9u8; 333];
    let mut w = SourceWriter::new(store.clone(), BlockType::DATA, 60, 20).expect("writer");
    w.write(&data).await.expect("write");
    let e = w.flush().await.expect("flush");

    let mut r = SourceReader::new(store.clone(), e).expect("reader");
    let mut sink = Vec::new();
    let n = r.write_to(&mut sink).await.expect("write_to");
    assert_eq!(n, 333);
    assert_eq!(sink, data);
}
