#![no_main]

use forgegram_bridge::{CallbackCodec, CALLBACK_DATA_LIMIT};
use forgegram_github::SUPPORTED_EVENTS;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let codec = CallbackCodec::new(&SUPPORTED_EVENTS);
    if let Some(command) = codec.decode(&raw) {
        if let Some(encoded) = codec.encode(&command) {
            assert!(encoded.len() <= CALLBACK_DATA_LIMIT);
            assert_eq!(codec.decode(&encoded), Some(command));
        }
    }
});
