//! Job framing over a continuous socket stream
//!
//! A POS client may keep one connection open and send several tickets back to
//! back ("print this 10 times"). The framer buffers what has arrived and cuts
//! a job off every time a paper-cut command completes.

use tracing::error;

use crate::buffer::ByteAccumulator;
use crate::escpos::{FULL_CUT, PARTIAL_CUT_PREFIX};

/// Per-connection job framer
#[derive(Debug)]
pub struct JobFramer {
    sink: ByteAccumulator,
}

impl JobFramer {
    /// Create a framer whose buffer starts at `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sink: ByteAccumulator::with_capacity(capacity),
        }
    }

    /// Feed freshly read bytes, returning every job they complete
    ///
    /// Jobs come back in the order their cut markers appear.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.sink.write_all(bytes);

        let mut jobs = Vec::new();
        while let Some(end) = self.next_job_end() {
            match self.sink.pop_from_top(end) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    // unreachable while `end` stays within the buffered size
                    error!(error = %e, "job boundary past buffered data");
                    break;
                }
            }
        }
        jobs
    }

    /// End offset of the first complete job, if one is buffered
    fn next_job_end(&self) -> Option<usize> {
        if let Some(i) = self.sink.index_of_pattern(&FULL_CUT) {
            return Some(i + FULL_CUT.len());
        }
        // prefix + one parameter byte; wait for the parameter if missing
        let i = self.sink.index_of_pattern(&PARTIAL_CUT_PREFIX)?;
        let end = i + PARTIAL_CUT_PREFIX.len() + 1;
        (self.sink.size() >= end).then_some(end)
    }

    /// Bytes buffered but not yet part of a complete job
    pub fn pending(&self) -> usize {
        self.sink.size()
    }

    /// Flush at end of stream
    ///
    /// Whatever is left becomes a final job, cut marker or not.
    pub fn finish(mut self) -> Option<Vec<u8>> {
        let rest = self.sink.as_slice().to_vec();
        self.sink.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

impl Default for JobFramer {
    fn default() -> Self {
        Self {
            sink: ByteAccumulator::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_with_cuts(k: usize) -> (Vec<u8>, Vec<Vec<u8>>) {
        let mut stream = Vec::new();
        let mut expected = Vec::new();
        for n in 0..k {
            let mut job = format!("ticket #{n}\nline two\n").into_bytes();
            job.extend_from_slice(&FULL_CUT);
            stream.extend_from_slice(&job);
            expected.push(job);
        }
        (stream, expected)
    }

    #[test]
    fn test_single_read_multiple_jobs() {
        let (stream, expected) = stream_with_cuts(3);
        let mut framer = JobFramer::default();
        assert_eq!(framer.push(&stream), expected);
        assert_eq!(framer.pending(), 0);
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_fragmentation_invariance() {
        let (stream, expected) = stream_with_cuts(5);
        for chunk in 1..=stream.len() {
            let mut framer = JobFramer::with_capacity(4);
            let mut jobs = Vec::new();
            for part in stream.chunks(chunk) {
                jobs.extend(framer.push(part));
            }
            assert_eq!(jobs, expected, "chunk size {chunk}");
            assert_eq!(framer.finish(), None);
        }
    }

    #[test]
    fn test_partial_cut_waits_for_parameter() {
        let mut framer = JobFramer::default();
        let mut first = b"HELLO".to_vec();
        first.extend_from_slice(&PARTIAL_CUT_PREFIX);

        assert!(framer.push(&first).is_empty());
        assert_eq!(framer.pending(), 7);

        let jobs = framer.push(&[0x01]);
        let mut expected = first.clone();
        expected.push(0x01);
        assert_eq!(jobs, vec![expected]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_full_cut_split_across_reads() {
        let mut framer = JobFramer::default();
        assert!(framer.push(b"abc\x1D").is_empty());
        // GS V alone looks like a partial cut awaiting its parameter
        assert!(framer.push(b"\x56").is_empty());
        let jobs = framer.push(b"\x00def");
        assert_eq!(jobs, vec![b"abc\x1D\x56\x00".to_vec()]);
        assert_eq!(framer.finish(), Some(b"def".to_vec()));
    }

    #[test]
    fn test_finish_flushes_unterminated_job() {
        let mut framer = JobFramer::default();
        assert!(framer.push(b"no cut here\n").is_empty());
        assert_eq!(framer.finish(), Some(b"no cut here\n".to_vec()));
    }

    #[test]
    fn test_back_to_back_markers() {
        let mut framer = JobFramer::with_capacity(1);
        let jobs = framer.push(b"\x1D\x56\x00\x1D\x56\x00\x1D\x56");
        assert_eq!(jobs, vec![FULL_CUT.to_vec(), FULL_CUT.to_vec()]);
        assert_eq!(framer.pending(), 2);
        assert_eq!(framer.push(b"\x41"), vec![b"\x1D\x56\x41".to_vec()]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_finish_empty() {
        assert_eq!(JobFramer::default().finish(), None);
    }

    #[test]
    fn test_mixed_cuts_in_order() {
        let mut framer = JobFramer::default();
        let jobs = framer.push(b"A\x1D\x56\x00B\x1D\x56\x42C");
        // the full cut ends the first job, "B" + GS V 'B' ends the second
        assert_eq!(jobs, vec![b"A\x1D\x56\x00".to_vec(), b"B\x1D\x56\x42".to_vec()]);
        assert_eq!(framer.finish(), Some(b"C".to_vec()));
    }
}
