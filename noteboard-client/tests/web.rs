//! Browser-target tests for the WASM-exposed reorder buffer, run with
//! `wasm-pack test`.

use noteboard_client::JsReorderBuffer;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn drains_buffered_frames_once_the_gap_fills() {
    let mut buf = JsReorderBuffer::new(0);

    let ready = buf.push(2, "{\"type\":\"yjs_update\"}".into(), 0.0);
    assert!(ready.is_empty());
    assert!(!buf.overflowed());

    let ready = buf.push(1, "{\"type\":\"user_joined\"}".into(), 0.0);
    assert_eq!(ready.len(), 2);
    assert_eq!(buf.next_expected_seq(), 3);
}

#[wasm_bindgen_test]
fn overflow_is_reported_once_pending_exceeds_the_cap() {
    let mut buf = JsReorderBuffer::new(0);
    for seq in 2..=(noteboard_client::MAX_PENDING as u32 + 1) {
        buf.push(seq, "{}".into(), 0.0);
    }
    assert!(!buf.overflowed());
    buf.push(noteboard_client::MAX_PENDING as u32 + 2, "{}".into(), 0.0);
    assert!(buf.overflowed());
}

#[wasm_bindgen_test]
fn gap_timer_fires_after_the_timeout() {
    let mut buf = JsReorderBuffer::new(0);
    buf.push(2, "{}".into(), 1_000.0);
    assert!(!buf.gap_elapsed(1_000.0 + noteboard_client::GAP_TIMEOUT_MS as f64 - 1.0));
    assert!(buf.gap_elapsed(1_000.0 + noteboard_client::GAP_TIMEOUT_MS as f64));
}
