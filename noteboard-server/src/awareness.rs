//! Awareness registry (C2): ephemeral per-client presence (cursors,
//! selections, labels), never persisted and never sequenced.
//!
//! The coordinator's job is a pure relay of opaque bytes
//! to every other session; this registry additionally keeps a live copy so
//! a newly joined client can be handed a full snapshot instead of waiting
//! for every existing peer to send another update. Malformed deltas are
//! dropped rather than surfaced — presence is self-healing at the next tick.

use anyhow::{Context, Result};
use tracing::debug;
use yrs::Doc;
use yrs::sync::{Awareness, AwarenessUpdate};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;

pub struct AwarenessRegistry {
    awareness: Awareness,
    /// Whether at least one delta has been applied since construction or
    /// the last [`AwarenessRegistry::clear`]; guards `full_snapshot` against
    /// handing a newly joined client a pointless empty update.
    has_entries: bool,
}

impl AwarenessRegistry {
    /// Awareness is tied to a `Doc` by the `yrs` API but this registry never
    /// touches text content, so the backing doc is a throwaway.
    pub fn new() -> Self {
        Self { awareness: Awareness::new(Doc::new()), has_entries: false }
    }

    /// Apply a relayed presence delta to keep the local snapshot current.
    /// The bytes themselves are still relayed verbatim by the caller; this
    /// is bookkeeping only, never a condition for forwarding.
    pub fn apply(&mut self, update_bytes: &[u8]) {
        let update = match AwarenessUpdate::decode_v1(update_bytes) {
            Ok(update) => update,
            Err(err) => {
                debug!("dropping malformed awareness update: {err}");
                return;
            }
        };
        match self.awareness.apply_update(update) {
            Ok(()) => self.has_entries = true,
            Err(err) => debug!("dropping malformed awareness update: {err}"),
        }
    }

    /// A full snapshot of every known entry, for a client that just joined.
    /// `None` if nobody has broadcast presence yet.
    pub fn full_snapshot(&self) -> Result<Option<Vec<u8>>> {
        if !self.has_entries {
            return Ok(None);
        }
        let update = self.awareness.update().context("encoding awareness snapshot")?;
        Ok(Some(update.encode_v1()))
    }

    /// Drop every known entry. Used at coordinator termination; per-client
    /// removal isn't attempted because the server never learns which
    /// awareness-layer integer a disconnecting session was using.
    pub fn clear(&mut self) {
        self.awareness = Awareness::new(Doc::new());
        self.has_entries = false;
    }
}

impl Default for AwarenessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
