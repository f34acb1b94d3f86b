#![no_main]

use libfuzzer_sys::fuzz_target;
use quorum_protocol::decode_frame;
use quorum_types::NetworkId;

fuzz_target!(|data: &[u8]| {
    // Header checks and body decoding must never panic, whatever the magic.
    for network in [NetworkId::Main, NetworkId::Test, NetworkId::Local] {
        if let Ok((_, used)) = decode_frame(network, data) {
            assert!(used <= data.len());
        }
    }
});
