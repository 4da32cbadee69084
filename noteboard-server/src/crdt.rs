//! CRDT replica (C1): an in-memory replicated text document.
//!
//! Updates are opaque bytes in and out; nothing in this module, or anything
//! above it, ever interprets their contents.

use anyhow::{Context, Result};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, Transact, Update};

/// Name of the shared text root, fixed for the life of the document.
const TEXT_NAME: &str = "content";

/// A single note's CRDT state. Presence/awareness is tracked separately by
/// [`crate::awareness::AwarenessRegistry`], not here.
pub struct CrdtReplica {
    doc: Doc,
    text: yrs::TextRef,
}

impl CrdtReplica {
    /// A fresh, empty replica.
    pub fn new() -> Self {
        let doc = Doc::new();
        let text = doc.get_or_insert_text(TEXT_NAME);
        Self { doc, text }
    }

    /// Rehydrate a replica from a previously persisted full state, falling
    /// back to an empty replica if `bytes` is empty (a brand-new note).
    pub fn from_state(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        let replica = Self::new();
        let update = Update::decode_v1(bytes).context("decoding persisted crdt state")?;
        {
            let mut txn = replica.doc.transact_mut();
            txn.apply_update(update).context("applying persisted crdt state")?;
        }
        Ok(replica)
    }

    /// Apply a binary update produced by any peer. Synchronous: this must
    /// never suspend with respect to the coordinator's timeline.
    pub fn apply(&self, update_bytes: &[u8]) -> Result<()> {
        let update = Update::decode_v1(update_bytes).context("decoding crdt update")?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update).context("applying crdt update")?;
        Ok(())
    }

    /// Full state, suitable for a fresh peer's initial sync or for
    /// persistence.
    pub fn full_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Compact summary of what this replica has seen.
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Everything newer than `remote_state_vector`.
    pub fn diff_since(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector).context("decoding remote state vector")?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Current plain-text rendering, derived from the CRDT state.
    pub fn text(&self) -> String {
        let txn = self.doc.transact();
        self.text.get_string(&txn)
    }

}

impl Default for CrdtReplica {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_then_read_text() {
        let replica = CrdtReplica::new();
        {
            let mut txn = replica.doc.transact_mut();
            replica.text.insert(&mut txn, 0, "Hello");
        }
        let update = replica.full_state();

        let peer = CrdtReplica::new();
        peer.apply(&update).unwrap();
        assert_eq!(peer.text(), "Hello");
    }

    #[test]
    fn convergence_regardless_of_order() {
        let a = CrdtReplica::new();
        {
            let mut txn = a.doc.transact_mut();
            a.text.insert(&mut txn, 0, "Hello");
        }
        let ua = a.full_state();

        let b = CrdtReplica::new();
        {
            let mut txn = b.doc.transact_mut();
            b.text.insert(&mut txn, 0, "World");
        }
        let ub = b.full_state();

        let left = CrdtReplica::new();
        left.apply(&ua).unwrap();
        left.apply(&ub).unwrap();

        let right = CrdtReplica::new();
        right.apply(&ub).unwrap();
        right.apply(&ua).unwrap();

        assert_eq!(left.text(), right.text());
    }

    #[test]
    fn duplicate_apply_is_a_no_op() {
        let replica = CrdtReplica::new();
        {
            let mut txn = replica.doc.transact_mut();
            replica.text.insert(&mut txn, 0, "Hello");
        }
        let update = replica.full_state();

        let peer = CrdtReplica::new();
        peer.apply(&update).unwrap();
        peer.apply(&update).unwrap();
        assert_eq!(peer.text(), "Hello");
    }

    #[test]
    fn malformed_update_is_rejected_without_poisoning_replica() {
        let replica = CrdtReplica::new();
        {
            let mut txn = replica.doc.transact_mut();
            replica.text.insert(&mut txn, 0, "Hello");
        }
        assert!(replica.apply(b"not a real update").is_err());
        assert_eq!(replica.text(), "Hello");
    }
}
