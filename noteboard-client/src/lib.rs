//! Client-side companion to the note session coordinator: the reorder
//! buffer, compiled to WASM so a browser editor can embed it directly next
//! to the JS Yjs runtime that owns the actual CRDT document and awareness
//! relative-position resolution.

mod reorder;

pub use reorder::{GAP_TIMEOUT_MS, MAX_PENDING, PushOutcome, ReorderBuffer};

use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// JS-facing reorder buffer operating on raw JSON text, since every durable
/// server frame is already a JSON string by the time it reaches the
/// browser. Narrows `seq` to `u32` at the boundary; a single connection's
/// lifetime is never expected to cross that many durable frames.
#[wasm_bindgen]
pub struct JsReorderBuffer {
    inner: ReorderBuffer<String>,
    overflowed: bool,
}

#[wasm_bindgen]
impl JsReorderBuffer {
    #[wasm_bindgen(constructor)]
    pub fn new(sync_seq: u32) -> JsReorderBuffer {
        JsReorderBuffer { inner: ReorderBuffer::new(sync_seq as u64), overflowed: false }
    }

    /// Push one durable frame. Returns the frames now ready to apply, in
    /// order; empty if this one was buffered or discarded as stale. Call
    /// [`JsReorderBuffer::overflowed`] afterward to check whether the
    /// caller should close the socket and reconnect.
    pub fn push(&mut self, seq: u32, frame_json: String, now_ms: f64) -> Vec<JsValue> {
        match self.inner.push(seq as u64, frame_json, now_ms as i64) {
            PushOutcome::Ready(frames) => {
                self.overflowed = false;
                frames.into_iter().map(JsValue::from).collect()
            }
            PushOutcome::Buffered | PushOutcome::Stale => Vec::new(),
            PushOutcome::Overflow => {
                self.overflowed = true;
                Vec::new()
            }
        }
    }

    /// Advance past the gap an ack fills in for its own originator.
    pub fn note_ack(&mut self, seq: u32) {
        self.inner.note_ack(seq as u64);
    }

    /// Poll on the embedding JS driver's own interval; WASM owns no timer.
    pub fn gap_elapsed(&self, now_ms: f64) -> bool {
        self.inner.gap_elapsed(now_ms as i64)
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn next_expected_seq(&self) -> u32 {
        self.inner.next_expected_seq() as u32
    }
}
