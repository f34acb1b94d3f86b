#![no_main]

use libfuzzer_sys::fuzz_target;
use quorum_consensus::validate;
use quorum_messages::Message;
use quorum_nullables::NullState;

fuzz_target!(|data: &[u8]| {
    // Validation of attacker-controlled content answers, it never panics.
    let Ok(mut msg) = Message::decode(data) else {
        return;
    };
    let state = NullState::new(3, 1).with_saved(2);
    let first = validate(&mut msg, &state);
    let second = validate(&mut msg, &state);
    if first == quorum_types::Validity::Invalid {
        assert_eq!(second, first);
    }
});
