#![no_main]

use dynbridge::{CmpOperator, Context, ContextOptions, EnvToken, ExtRefIndex, ExtRefTag, Value};
use libfuzzer_sys::fuzz_target;

const MAX_VALUES: usize = 16;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let Ok(mut ctx) = Context::init_with_options(ContextOptions::quiet()) else {
        return;
    };

    let values: Vec<Value> = data
        .chunks(3)
        .take(MAX_VALUES)
        .map(|chunk| build_value(&mut ctx, chunk))
        .collect();

    for &lhs in &values {
        for &rhs in &values {
            let eq = ctx.cmp(lhs, rhs, CmpOperator::Eq).expect("live operands compare");
            let ne = ctx.cmp(lhs, rhs, CmpOperator::Ne).expect("live operands compare");
            assert_ne!(eq, ne);
            let seq = ctx.cmp(lhs, rhs, CmpOperator::StrictEq).expect("live operands compare");
            let sne = ctx.cmp(lhs, rhs, CmpOperator::StrictNe).expect("live operands compare");
            assert_ne!(seq, sne);
            assert_eq!(eq, seq);
        }
    }
});

fn build_value(ctx: &mut Context, chunk: &[u8]) -> Value {
    let byte = |i: usize| chunk.get(i).copied().unwrap_or(0);
    match byte(0) % 9 {
        0 => ctx.new_undefined(),
        1 => ctx.new_null(),
        2 => ctx.new_boolean(byte(1) % 2 == 0),
        3 => ctx.new_number(f64::from(i16::from_le_bytes([byte(1), byte(2)])) / 4.0),
        4 => ctx.new_number(f64::NAN),
        5 => ctx.new_string(&format!("{}", byte(1) % 8)),
        6 => ctx.new_bigint(i64::from(byte(1)) - 128),
        7 => ctx.new_object(),
        _ => {
            let tag = match byte(1) % 4 {
                0 => ExtRefTag::Object,
                1 => ExtRefTag::Function,
                2 => ExtRefTag::Interface,
                _ => ExtRefTag::Array,
            };
            ctx.new_extref(ExtRefIndex(u32::from(byte(2) % 4)), tag, EnvToken(0))
        }
    }
}
