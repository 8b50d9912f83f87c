use proptest::prelude::*;

use dcmon::logline;
use dcmon::script::{ScriptEngine, Value};

proptest! {
    /// Any i64 pushed through the bridge comes back bit-identical.
    #[test]
    fn integers_round_trip(n in any::<i64>()) {
        let eng = ScriptEngine::new().unwrap();
        eng.set("probe", n).unwrap();
        prop_assert_eq!(eng.get("probe").unwrap(), Value::Int(n));
    }
}

proptest! {
    /// Any finite f64 round-trips exactly (Lua numbers are doubles).
    #[test]
    fn floats_round_trip(f in proptest::num::f64::NORMAL | proptest::num::f64::ZERO | proptest::num::f64::SUBNORMAL) {
        let eng = ScriptEngine::new().unwrap();
        eng.set("probe", f).unwrap();
        match eng.get("probe").unwrap() {
            Value::Float(g) => prop_assert_eq!(g.to_bits(), f.to_bits()),
            other => prop_assert!(false, "unexpected: {:?}", other),
        }
    }
}

proptest! {
    /// Any unicode string survives the boundary unchanged.
    #[test]
    fn strings_round_trip(s in "\\PC*") {
        let eng = ScriptEngine::new().unwrap();
        eng.set("probe", s.as_str()).unwrap();
        prop_assert_eq!(eng.get("probe").unwrap(), Value::Str(s));
    }
}

proptest! {
    /// The log-line splitter never panics, whatever docker emits.
    #[test]
    fn log_parsing_never_panics(line in "\\PC*") {
        let _ = logline::parse(&line);
        let _ = logline::clean_message(&line);
    }
}

proptest! {
    /// Well-formed compose log lines always recover their parts.
    /// (`Z` is excluded from the generated text: a literal `Z ` in the
    /// message is indistinguishable from a docker timestamp suffix.)
    #[test]
    fn well_formed_lines_recover_fields(
        container in "[a-z][a-z0-9_-]{0,20}",
        message in "[^|\\r\\nZ]{0,60}",
    ) {
        let line = format!("{container} | {message}");
        let raw = logline::parse(&line).unwrap();
        prop_assert_eq!(raw.container, container);
        prop_assert_eq!(raw.message, message.trim_end());
    }
}
