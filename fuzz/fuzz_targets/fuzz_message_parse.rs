#![no_main]

use libfuzzer_sys::fuzz_target;
use quorum_messages::Message;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes either decode or fail cleanly. Anything that decodes
    // must decode again from its own encoding.
    let Ok(msg) = Message::decode(data) else {
        return;
    };
    let encoded = msg.encode();
    let again = Message::decode(&encoded);
    assert!(again.is_ok(), "{} failed to re-decode", msg.kind());
    let _ = Message::decode_prefix(data);
});
