use crate::error::Result;
use crate::pipeline::chunker::TimestampChunker;
use crate::pipeline::format::FlowFormatter;
use crate::pipeline::producer::ProducerHandle;
use crate::structs::EnhancedFlowRecord;

use crossbeam_channel::{Receiver, TryRecvError};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// How long the collector parks when a polling sweep finds nothing.
const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Single-consumer side of the pipeline. Drains every producer buffer
/// opportunistically, windows records through the chunker, and emits each
/// complete chunk sorted and formatted. The sink is borrowed, never owned.
///
/// Sink failures are fatal and propagate; a producer dying early is not
/// (its buffer disconnects, which counts as done).
pub struct Collector<'a, W: Write> {
    buffers: Vec<Receiver<EnhancedFlowRecord>>,
    chunker: TimestampChunker,
    formatter: FlowFormatter,
    sink: &'a mut W,
    suppress_header: bool,
    flows_collected: u64,
}

impl<'a, W: Write> Collector<'a, W> {
    pub fn new(
        buffers: Vec<Receiver<EnhancedFlowRecord>>,
        chunk_duration_ns: u64,
        formatter: FlowFormatter,
        sink: &'a mut W,
        suppress_header: bool,
    ) -> Self {
        Collector {
            buffers,
            chunker: TimestampChunker::new(chunk_duration_ns),
            formatter,
            sink,
            suppress_header,
            flows_collected: 0,
        }
    }

    /// Run until every producer has published `done` and every buffer is
    /// drained, then flush the chunker and close the stream. On shutdown,
    /// already-buffered records are still emitted so the output stays well
    /// formed.
    pub fn run(
        &mut self,
        producers: &[ProducerHandle],
        shutdown: &AtomicBool,
    ) -> Result<u64> {
        log::trace!("collector starts");
        self.formatter
            .write_header(self.sink, self.suppress_header)?;

        loop {
            let transferred = self.poll_buffers();
            if transferred > 0 {
                self.drain_complete_chunks()?;
                continue;
            }

            let all_done = producers.iter().all(ProducerHandle::is_done);
            if all_done && self.buffers_empty() {
                break;
            }
            if shutdown.load(Ordering::Relaxed) && self.buffers_empty() {
                // producers will notice the flag themselves; stop waiting
                // for records that may never come
                break;
            }
            thread::park_timeout(POLL_TIMEOUT);
        }

        for mut chunk in self.chunker.flush_all() {
            self.emit_chunk(&mut chunk)?;
        }
        self.formatter.write_footer(self.sink)?;
        self.sink.flush()?;
        log::trace!("collector stops after {} flows", self.flows_collected);
        Ok(self.flows_collected)
    }

    /// One non-blocking sweep over all producer buffers.
    fn poll_buffers(&mut self) -> usize {
        let mut transferred = 0;
        for index in 0..self.buffers.len() {
            loop {
                let polled = self.buffers[index].try_recv();
                match polled {
                    Ok(record) => {
                        self.chunker.add(record);
                        self.flows_collected += 1;
                        transferred += 1;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
        }
        transferred
    }

    fn buffers_empty(&self) -> bool {
        self.buffers.iter().all(Receiver::is_empty)
    }

    fn drain_complete_chunks(&mut self) -> Result<()> {
        while let Some(mut chunk) = self.chunker.take_complete_chunk() {
            if !chunk.is_empty() {
                self.emit_chunk(&mut chunk)?;
            }
        }
        Ok(())
    }

    fn emit_chunk(&mut self, chunk: &mut Vec<EnhancedFlowRecord>) -> Result<()> {
        self.formatter.sort_records(chunk);
        for record in chunk.iter() {
            self.formatter.write_record(self.sink, record)?;
        }
        Ok(())
    }
}
