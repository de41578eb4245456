#![no_main]

use chatlog_store::{safe_name, Period};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    let name = safe_name(&raw);
    assert!(!name.is_empty());
    assert!(!name.contains(['/', '\\', '<', '>', ':', '"', '|', '?', '*']));
    assert!(!name.chars().any(char::is_control));
    assert!(name != "." && name != "..");

    if let Some(period) = Period::parse(&raw) {
        assert!((1..=12).contains(&period.month()));
        assert_eq!(Period::from_file_name(&period.file_name()), Some(period));
    }
});
