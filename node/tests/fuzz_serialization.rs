//! Property-based fuzz tests for the wire boundary.
//!
//! Every frame a peer sends crosses a trust boundary. Arbitrary bytes must
//! never panic the decoder or the pipeline; they either decode to a message
//! or are counted as malformed and dropped.

use std::sync::Arc;

use proptest::prelude::*;

use quorum_messages::{Bounce, Message, MissingData, Ping};
use quorum_network::bounded;
use quorum_node::{Inbound, NodeConfig, NodeMetrics, Pipeline};
use quorum_nullables::{authority, NullState};
use quorum_protocol::{decode_frame, encode_frame, HEADER_LEN};
use quorum_types::{Hash, NetworkId, Timestamp};

fn sample_frames() -> Vec<Vec<u8>> {
    let bounce = Message::Bounce(Bounce::new(Ping {
        name: "fuzz".into(),
        number: 3,
        timestamp: Timestamp::from_secs(1),
        stamps: vec![Timestamp::from_secs(2)],
        data: vec![1, 2, 3],
    }));
    let missing = Message::MissingData(MissingData::new(Hash::new([4; 32]), Timestamp::from_secs(5)));
    [bounce, missing]
        .iter()
        .filter_map(|m| encode_frame(NetworkId::Local, m).ok())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn fuzz_decode_arbitrary_bytes(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_frame(NetworkId::Local, &data);
        let _ = Message::decode(&data);
    }

    #[test]
    fn fuzz_decode_mutated_bodies(
        pick in 0usize..2,
        flips in proptest::collection::vec((any::<usize>(), any::<u8>()), 1..8),
    ) {
        let mut frame = sample_frames()[pick].clone();
        let body_len = frame.len() - HEADER_LEN;
        for (pos, byte) in flips {
            frame[HEADER_LEN + pos % body_len] = byte;
        }
        if let Ok((msg, used)) = decode_frame(NetworkId::Local, &frame) {
            prop_assert_eq!(used, frame.len());
            // Whatever decoded re-encodes without panicking.
            let _ = msg.encode();
        }
    }

    #[test]
    fn fuzz_pipeline_never_panics(frames in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..256), 1..16)) {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let _guard = runtime.enter();
        let (in_tx, _in_rx) = bounded("inbound", 64);
        let (out_tx, _out_rx) = bounded("outbound", 1024);
        let metrics = Arc::new(NodeMetrics::new());
        let mut pipeline = Pipeline::new(
            &NodeConfig::default(),
            NullState::new(1, 0),
            authority(1).1,
            in_tx,
            out_tx,
            metrics.clone(),
        );
        let count = frames.len() as u64;
        for frame in frames {
            pipeline.handle_frame(Inbound { peer: 1, peer_addr: "fuzz".into(), frame });
        }
        prop_assert_eq!(metrics.messages_decoded.get() + metrics.messages_malformed.get(), count);
    }
}
