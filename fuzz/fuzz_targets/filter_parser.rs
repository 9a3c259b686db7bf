#![no_main]

use libfuzzer_sys::fuzz_target;
use memstress::filter::SampleFilter;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Must reject bad expressions with an error, never panic
        let _ = SampleFilter::from_expr(input);
    }
});
