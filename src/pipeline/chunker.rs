use crate::structs::EnhancedFlowRecord;

use std::collections::BTreeMap;

/// Groups records into fixed time windows keyed by
/// `chunk_id = first_timestamp / chunk_duration_ns`.
///
/// A chunk is complete once any record from a strictly newer window has been
/// buffered: producers only ever move forward in time, so a later arrival
/// proves the oldest window can no longer grow. Completeness is inferred
/// from that forward progress, never from wall time.
pub struct TimestampChunker {
    chunk_duration_ns: u64,
    chunks: BTreeMap<u64, Vec<EnhancedFlowRecord>>,
    oldest_chunk_id: Option<u64>,
}

impl TimestampChunker {
    pub fn new(chunk_duration_ns: u64) -> Self {
        assert!(chunk_duration_ns > 0, "chunk duration must be positive");
        TimestampChunker {
            chunk_duration_ns,
            chunks: BTreeMap::new(),
            oldest_chunk_id: None,
        }
    }

    pub fn chunk_id(&self, timestamp_ns: u64) -> u64 {
        timestamp_ns / self.chunk_duration_ns
    }

    pub fn add(&mut self, record: EnhancedFlowRecord) {
        let id = self.chunk_id(record.first_timestamp);
        self.chunks.entry(id).or_default().push(record);
        if self.oldest_chunk_id.is_none() {
            self.oldest_chunk_id = Some(id);
        }
    }

    pub fn has_complete_chunk(&self) -> bool {
        match (self.oldest_chunk_id, self.chunks.keys().next_back()) {
            (Some(oldest), Some(&newest)) => newest > oldest,
            _ => false,
        }
    }

    /// Extract the oldest chunk if it is complete and advance the window by
    /// one. A window that never saw a record yields an empty vector; the
    /// caller skips those.
    pub fn take_complete_chunk(&mut self) -> Option<Vec<EnhancedFlowRecord>> {
        if !self.has_complete_chunk() {
            return None;
        }
        let oldest = self.oldest_chunk_id.expect("checked by has_complete_chunk");
        self.oldest_chunk_id = Some(oldest + 1);
        Some(self.chunks.remove(&oldest).unwrap_or_default())
    }

    /// Drain every remaining chunk in window order. Terminal: the chunker
    /// forgets its oldest window and can be reused from scratch.
    pub fn flush_all(&mut self) -> Vec<Vec<EnhancedFlowRecord>> {
        self.oldest_chunk_id = None;
        std::mem::take(&mut self.chunks)
            .into_values()
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    /// Number of buffered records across all pending chunks.
    pub fn pending_records(&self) -> usize {
        self.chunks.values().map(Vec::len).sum()
    }

    pub fn pending_chunks(&self) -> usize {
        self.chunks.len()
    }
}
