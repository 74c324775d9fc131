//! Diagnostic messages reach a registered sink.
//!
//! Kept in its own test binary: sink registration is global and permanent
//! for the process.

use core::fmt;
use std::sync::Mutex;

use halffit::diag::{register_diag_sink, DiagSink};
use halffit::errors::DiagError;
use halffit::{AllocError, HalfFitAllocator, ARENA_SIZE};

struct CaptureSink(Mutex<Vec<String>>);

impl DiagSink for CaptureSink {
    fn emit(&self, msg: fmt::Arguments) {
        self.0.lock().unwrap().push(msg.to_string());
    }
}

static SINK: CaptureSink = CaptureSink(Mutex::new(Vec::new()));

#[test]
fn allocator_traffic_is_reported() {
    register_diag_sink(&SINK).expect("no sink registered yet");
    assert_eq!(
        register_diag_sink(&SINK).unwrap_err(),
        DiagError::AlreadyRegistered
    );

    let mut heap = HalfFitAllocator::new();
    heap.init();

    let p = heap.alloc(100);
    assert!(!p.is_null());
    unsafe { heap.free(p) };

    assert_eq!(heap.try_alloc(ARENA_SIZE).unwrap_err(), AllocError::RequestTooLarge);
    assert!(heap.alloc(ARENA_SIZE).is_null());

    let lines = SINK.0.lock().unwrap();
    assert!(
        lines.iter().any(|l| l.starts_with("[info] halffit : arena initialized")),
        "missing init line in {lines:?}"
    );
    assert!(
        lines.iter().any(|l| l.starts_with("[info] halffit : split chunk")),
        "missing split line in {lines:?}"
    );
    assert!(
        lines.iter().any(|l| l.starts_with("[error] halffit : allocation")),
        "missing failure line in {lines:?}"
    );
}
