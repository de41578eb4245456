//! Dedup cache tests covering expiry, capacity, and fingerprint behavior.
use std::sync::Arc;
use std::thread;

use chatlog_contract::{normalize_message_value, InboundMessage, MessageBody, MessageKind};
use chatlog_core::ManualClock;
use serde_json::json;

use super::{fingerprint, DedupCache, DedupConfig};

fn text_message(content: &str) -> InboundMessage {
    InboundMessage::text(content)
        .with_sender("wxid_ada", "Ada")
        .with_conversation("room-1", "Ops")
}

fn cache_with_clock(max_size: usize, ttl_seconds: u64) -> (DedupCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let cache = DedupCache::with_clock(
        DedupConfig {
            max_size,
            ttl_seconds,
        },
        clock.clone(),
    );
    (cache, clock)
}

#[test]
fn second_sighting_is_duplicate() {
    let (cache, _clock) = cache_with_clock(10, 60);
    let message = text_message("hello");
    assert!(!cache.is_duplicate(&message));
    assert!(cache.is_duplicate(&message));
    assert_eq!(cache.len(), 1);
}

#[test]
fn entry_expires_after_ttl() {
    let (cache, clock) = cache_with_clock(10, 60);
    let message = text_message("hello");
    assert!(!cache.is_duplicate(&message));

    clock.advance_secs(59);
    assert!(cache.is_duplicate(&message));

    clock.advance_secs(1);
    assert!(!cache.is_duplicate(&message));
    assert!(cache.is_duplicate(&message));
}

#[test]
fn duplicate_hit_does_not_refresh_insertion_time() {
    let (cache, clock) = cache_with_clock(10, 60);
    let message = text_message("hello");
    assert!(!cache.is_duplicate(&message));
    clock.advance_secs(30);
    assert!(cache.is_duplicate(&message));
    clock.advance_secs(30);
    assert!(!cache.is_duplicate(&message));
}

#[test]
fn expiry_runs_on_every_check() {
    let (cache, clock) = cache_with_clock(10, 5);
    for index in 0..4 {
        assert!(!cache.is_duplicate(&text_message(&format!("m{index}"))));
    }
    assert_eq!(cache.len(), 4);
    clock.advance_secs(5);
    assert!(!cache.is_duplicate(&text_message("fresh")));
    assert_eq!(cache.len(), 1);
}

#[test]
fn capacity_evicts_in_insertion_order() {
    let (cache, _clock) = cache_with_clock(2, 60);
    let a = text_message("A");
    let b = text_message("B");
    let c = text_message("C");
    assert!(!cache.is_duplicate(&a));
    assert!(!cache.is_duplicate(&b));
    assert!(!cache.is_duplicate(&c));
    assert_eq!(cache.len(), 2);

    assert!(cache.snapshot(&fingerprint(&a)).is_none());
    assert!(!cache.is_duplicate(&a));
    assert_eq!(cache.len(), 2);
    assert!(cache.snapshot(&fingerprint(&b)).is_none());
    assert!(cache.snapshot(&fingerprint(&c)).is_some());
    assert!(cache.snapshot(&fingerprint(&a)).is_some());
}

#[test]
fn overflow_forgets_exactly_the_earliest_entries() {
    let max_size = 50;
    let extra = 7;
    let (cache, _clock) = cache_with_clock(max_size, 600);
    let messages = (0..max_size + extra)
        .map(|index| text_message(&format!("msg-{index}")))
        .collect::<Vec<_>>();
    for message in &messages {
        assert!(!cache.is_duplicate(message));
    }
    assert_eq!(cache.len(), max_size);

    for message in &messages[extra..] {
        assert!(cache.snapshot(&fingerprint(message)).is_some());
    }
    for message in &messages[..extra] {
        assert!(cache.snapshot(&fingerprint(message)).is_none());
    }
    for message in messages[extra..].iter().rev() {
        assert!(cache.is_duplicate(message));
    }
}

#[test]
fn zero_capacity_remembers_nothing() {
    let (cache, _clock) = cache_with_clock(0, 60);
    assert_eq!(cache.config().max_size, 0);
    let message = text_message("solo");
    assert!(!cache.is_duplicate(&message));
    assert!(!cache.is_duplicate(&message));
    assert_eq!(cache.len(), 0);
    assert!(cache.snapshot(&fingerprint(&message)).is_none());
}

#[test]
fn snapshot_keeps_first_seen_message() {
    let (cache, _clock) = cache_with_clock(10, 60);
    let first = text_message("same").with_message_id("m-1");
    let second = text_message("same").with_message_id("m-2");
    assert!(!cache.is_duplicate(&first));
    assert!(cache.is_duplicate(&second));
    let stored = cache.snapshot(&fingerprint(&second)).expect("snapshot");
    assert_eq!(stored.message_id, "m-1");
}

#[test]
fn fingerprint_distinguishes_content() {
    assert_ne!(
        fingerprint(&text_message("one")),
        fingerprint(&text_message("two"))
    );
}

#[test]
fn fingerprint_keys_on_the_client_type_string() {
    let mut emoticon = text_message("[smile]");
    emoticon.raw_type = "Message#Emoticon".to_string();
    let mut text = text_message("[smile]");
    text.raw_type = "Message#Text".to_string();
    assert_eq!(emoticon.kind(), text.kind());
    assert_ne!(fingerprint(&emoticon), fingerprint(&text));
    assert!(fingerprint(&text).as_str().starts_with("Message#Text|wxid_ada|"));

    let (cache, _clock) = cache_with_clock(10, 60);
    assert!(!cache.is_duplicate(&emoticon));
    assert!(!cache.is_duplicate(&text));
    assert!(cache.is_duplicate(&text));

    let mut padded = text_message("[smile]");
    padded.raw_type = "  ".to_string();
    assert!(fingerprint(&padded).as_str().starts_with("text|"));
}

#[test]
fn fingerprint_ignores_non_key_fields() {
    let left = text_message("same").with_message_id("1");
    let mut right = text_message("same").with_message_id("2");
    right.sender.name = "Someone Else".to_string();
    right.raw = json!({"anything": true});
    assert_eq!(fingerprint(&left), fingerprint(&right));
}

#[test]
fn fingerprint_includes_media_references_in_order() {
    let build = |references: Vec<&str>| InboundMessage {
        body: MessageBody::media(
            MessageKind::Image,
            String::new(),
            references.into_iter().map(str::to_string).collect(),
        ),
        ..text_message("")
    };
    let ab = build(vec!["/a.jpg", "/b.jpg"]);
    let ab_again = build(vec!["/a.jpg", "/b.jpg"]);
    let ba = build(vec!["/b.jpg", "/a.jpg"]);
    let none = build(vec![]);

    assert_eq!(fingerprint(&ab), fingerprint(&ab_again));
    assert_ne!(fingerprint(&ab), fingerprint(&ba));
    assert_ne!(fingerprint(&ab), fingerprint(&none));
    assert_eq!(fingerprint(&ab).as_str(), "image|wxid_ada||room-1|/a.jpg|/b.jpg");
}

#[test]
fn malformed_input_degrades_to_empty_components() {
    let message = normalize_message_value(json!({}));
    assert_eq!(fingerprint(&message).as_str(), "text|||");
    let (cache, _clock) = cache_with_clock(10, 60);
    assert!(!cache.is_duplicate(&message));
    assert!(cache.is_duplicate(&normalize_message_value(json!({ "type": null }))));
}

#[test]
fn concurrent_callers_accept_each_fingerprint_once() {
    let (cache, _clock) = cache_with_clock(1_000, 60);
    let cache = Arc::new(cache);
    let handles = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                (0..100)
                    .filter(|index| !cache.is_duplicate(&text_message(&format!("m{index}"))))
                    .count()
            })
        })
        .collect::<Vec<_>>();
    let accepted: usize = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .sum();
    assert_eq!(accepted, 100);
    assert_eq!(cache.len(), 100);
}
