#![no_main]

use forgegram_github::{parse_github_event, SUPPORTED_EVENTS};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let event_type = SUPPORTED_EVENTS
        .get(usize::from(selector) % (SUPPORTED_EVENTS.len() + 1))
        .map(|event| event.name)
        .unwrap_or("pull_request_review_comment");
    if let Ok(event) = parse_github_event(Some(event_type), body) {
        assert!(!event.name().is_empty());
        let _ = event.repository();
    }
});
