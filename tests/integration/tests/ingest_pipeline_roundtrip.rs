use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
    thread,
};

use chatlog_contract::InboundMessage;
use chatlog_core::ManualClock;
use chatlog_dedup::{DedupCache, DedupConfig};
use chatlog_runtime::{MessagePipeline, MessageSink, PipelineOutcome, PipelinePolicy};
use chatlog_store::{ConversationKind, LogEntry, LogStore, LogStoreConfig, Period};
use serde_json::json;

const START_MS: u64 = 1_717_200_000_000;

#[derive(Default)]
struct CollectingSink {
    prompts: Mutex<Vec<String>>,
}

impl MessageSink for CollectingSink {
    fn forward_to_model(&self, _message: &InboundMessage, prompt: &str) -> anyhow::Result<()> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        Ok(())
    }

    fn send_welcome(&self, _message: &InboundMessage) -> anyhow::Result<()> {
        Ok(())
    }
}

fn open_store(root: &Path, clock: Arc<ManualClock>) -> Arc<LogStore> {
    Arc::new(
        LogStore::with_clock(
            LogStoreConfig {
                root: root.to_path_buf(),
                lock_wait_ms: 10_000,
            },
            clock,
        )
        .expect("open store"),
    )
}

fn room_line(sender: &str, content: &str) -> String {
    json!({
        "type": "Message#Text",
        "talker": format!("Contact<{sender}>@Room<Ops Room>"),
        "talker_id": format!("wxid_{sender}"),
        "room_id": "room-ops",
        "content": content,
    })
    .to_string()
}

#[test]
fn integration_concurrent_ingest_logs_each_message_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new(START_MS));
    let sink = Arc::new(CollectingSink::default());
    let pipeline = Arc::new(MessagePipeline::new(
        Arc::new(DedupCache::with_clock(DedupConfig::default(), clock.clone())),
        open_store(temp.path(), clock.clone()),
        PipelinePolicy {
            bot_name: Some("helper".to_string()),
            ..PipelinePolicy::default()
        },
        sink.clone(),
    ));

    let lines = (0..40)
        .map(|index| room_line("ada", &format!("@helper question {index}")))
        .collect::<Arc<[String]>>();
    let handles = (0..4)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let lines = Arc::clone(&lines);
            thread::spawn(move || {
                lines
                    .iter()
                    .map(|line| pipeline.handle_raw(line).expect("handle"))
                    .filter(|outcome| matches!(outcome, PipelineOutcome::Logged { .. }))
                    .count()
            })
        })
        .collect::<Vec<_>>();
    let logged: usize = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .sum();
    assert_eq!(logged, 40);

    let entries = pipeline
        .store()
        .get_history(ConversationKind::Group, "Ops Room", None, None)
        .expect("history")
        .collect::<Vec<_>>();
    assert_eq!(entries.len(), 40);
    assert!(entries
        .iter()
        .all(|entry| entry.conversation_id == "room-ops" && entry.sender_id == "wxid_ada"));

    let mut prompts = sink.prompts.lock().expect("prompts lock").clone();
    prompts.sort();
    prompts.dedup();
    assert_eq!(prompts.len(), 40);
}

#[test]
fn integration_independent_store_handles_serialize_on_the_same_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new(START_MS));
    let stores = [
        open_store(temp.path(), clock.clone()),
        open_store(temp.path(), clock.clone()),
    ];

    let handles = stores
        .iter()
        .enumerate()
        .flat_map(|(store_index, store)| {
            (0..3).map(move |writer| (store_index, writer, Arc::clone(store)))
        })
        .map(|(store_index, writer, store)| {
            thread::spawn(move || {
                for index in 0..20 {
                    let message = InboundMessage::text(format!(
                        "{store_index}-{writer}-{index}-{}",
                        "y".repeat(2_048)
                    ))
                    .with_sender("wxid_bob", "Bob");
                    store
                        .append(&message, ConversationKind::Private, "wxid_bob", "Bob")
                        .expect("append");
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("join");
    }

    let log_path = temp
        .path()
        .join("private")
        .join("Bob")
        .join(Period::from_unix_ms(START_MS).file_name());
    let raw = fs::read_to_string(log_path).expect("read log");
    let parsed = raw
        .lines()
        .map(|line| serde_json::from_str::<LogEntry>(line).expect("whole line"))
        .collect::<Vec<_>>();
    assert_eq!(parsed.len(), 2 * 3 * 20);
}

#[test]
fn integration_image_message_captures_original_media() {
    let source = tempfile::tempdir().expect("source tempdir");
    let image_dir = source.path().join("FileStorage").join("Image").join("2024-06");
    let thumb_dir = source.path().join("FileStorage").join("Image").join("Thumb");
    fs::create_dir_all(&image_dir).expect("image dir");
    fs::create_dir_all(&thumb_dir).expect("thumb dir");
    let original = image_dir.join("cat.png");
    let thumbnail = thumb_dir.join("cat_t.png");
    fs::write(&original, [0x89, b'P', b'N', b'G']).expect("write original");
    fs::write(&thumbnail, [0x00]).expect("write thumbnail");

    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new(START_MS));
    let pipeline = MessagePipeline::new(
        Arc::new(DedupCache::with_clock(DedupConfig::default(), clock.clone())),
        open_store(temp.path(), clock),
        PipelinePolicy::default(),
        Arc::new(CollectingSink::default()),
    );

    let raw = format!(
        "pic msg {}",
        json!([original.to_string_lossy(), thumbnail.to_string_lossy()])
    );
    let outcome = pipeline.handle_raw(&raw).expect("handle");
    assert!(matches!(
        outcome,
        PipelineOutcome::Logged {
            forwarded: false,
            media_failures: 0,
            ..
        }
    ));

    let entries = pipeline
        .store()
        .get_history(ConversationKind::Private, "unknown_sender", None, None)
        .expect("history")
        .collect::<Vec<_>>();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message_type, "image");
    assert_eq!(entries[0].media.len(), 1);
    let record = &entries[0].media[0];
    assert_eq!(record.original_name, "cat.png");
    assert_eq!(record.mime_type, "image/png");
    assert_eq!(
        fs::read(temp.path().join(&record.stored_path)).expect("stored media"),
        vec![0x89, b'P', b'N', b'G']
    );
}
