#![no_main]

use libfuzzer_sys::fuzz_target;

/// Keep the harness itself bounded; real measure scripts stay far below this.
const MAX_INPUT_BYTES: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > MAX_INPUT_BYTES {
        &data[..MAX_INPUT_BYTES]
    } else {
        data
    };

    // Accept arbitrary bytes as input; treat invalid UTF-8 lossy.
    let script = String::from_utf8_lossy(data);

    let _ = formula_measures::scanner::tokenize(&script);
    let Ok(container) = formula_measures::parse_script(&script) else {
        return;
    };

    // Whatever parses must render to a script that parses to the same measures.
    let rendered = formula_measures::render(&container);
    let reparsed = formula_measures::parse_script(&rendered)
        .expect("rendered script failed to parse");
    assert_eq!(
        reparsed.measures().collect::<Vec<_>>(),
        container.measures().collect::<Vec<_>>()
    );
});
