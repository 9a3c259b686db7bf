#![no_main]

use libfuzzer_sys::fuzz_target;
use memstress::trace::{parse_record, TraceIngestor};
use std::io::Cursor;
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        for line in input.lines() {
            let _ = parse_record(line, 100.0);
        }

        // Whole-stream ingestion stops at the first error
        let names = vec!["orig".to_string(), "app".to_string()];
        let stream = TraceIngestor::default().stream(Cursor::new(input), Path::new("fuzz.prv"), names, None);
        for sample in stream {
            if sample.is_err() {
                break;
            }
        }
    }
});
