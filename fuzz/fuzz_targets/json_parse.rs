#![no_main]

use dynbridge::{Context, ContextOptions};
use libfuzzer_sys::fuzz_target;

const MAX_INPUT_BYTES: usize = 4096;

fuzz_target!(|data: &[u8]| {
    if data.len() > MAX_INPUT_BYTES {
        return;
    }
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(mut ctx) = Context::init_with_options(ContextOptions::quiet()) else {
        return;
    };

    match ctx.parse_json(text) {
        Ok(value) => {
            // Whatever parsed must dump and re-serialize without touching
            // the exception slot.
            assert!(ctx.dump_value_string(value).is_ok());
            let json = ctx.to_json(value).expect("parsed JSON re-serializes");
            let again = ctx.parse_json(&json).expect("serialized JSON parses");
            assert_eq!(ctx.to_json(again).expect("second serialization"), json);
            assert!(!ctx.has_exception());
        }
        Err(err) => {
            assert!(err.is_exception());
            assert!(ctx.has_exception());
            let mut sink = Vec::new();
            assert!(ctx.dump_error(&mut sink).expect("dump to memory"));
            assert!(ctx.has_exception());
        }
    }

    ctx.collect();
    assert_eq!(ctx.held_count(), 0);
});
