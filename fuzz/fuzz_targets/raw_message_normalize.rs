#![no_main]

use chatlog_contract::normalize_raw_message;
use chatlog_dedup::{fingerprint, DedupCache, DedupConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let message = normalize_raw_message(&raw);

    let key = fingerprint(&message);
    let type_part = match message.raw_type.trim() {
        "" => message.kind().as_str(),
        raw_type => raw_type,
    };
    assert!(key.as_str().starts_with(type_part));
    assert_eq!(key, fingerprint(&message.clone()));

    let cache = DedupCache::new(DedupConfig {
        max_size: 4,
        ttl_seconds: 60,
    });
    assert!(!cache.is_duplicate(&message));
    assert!(cache.is_duplicate(&message));
    assert_eq!(cache.len(), 1);
});
