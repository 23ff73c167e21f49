#![no_main]

use libfuzzer_sys::fuzz_target;

const MAX_INPUT_BYTES: usize = 256 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > MAX_INPUT_BYTES {
        &data[..MAX_INPUT_BYTES]
    } else {
        data
    };
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Both document readers must fail with a structured error rather than panic, and merging what
    // was read back into the same document must succeed.
    if let Ok(container) = formula_measures::parse(text) {
        let _ = formula_measures::merge(&container, text);
    }
});
