#![no_main]

use std::sync::Arc;

use forgegram_bridge::{AesGcmSealer, TenantTokenCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(sealer) = AesGcmSealer::from_key_bytes(&[3u8; 32]) else {
        return;
    };
    let codec = TenantTokenCodec::new(Arc::new(sealer));
    let raw = String::from_utf8_lossy(data);
    if let Some(chat_id) = codec.decode(&raw) {
        let reencoded = codec.encode(chat_id).expect("encode decoded chat id");
        assert_eq!(codec.decode(&reencoded), Some(chat_id));
    }
});
