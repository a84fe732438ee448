//! Incremental splitter for a raw MJPEG byte stream.
//!
//! ffmpeg's `-f mjpeg` output is a plain concatenation of JPEG images;
//! frames are recovered by scanning for SOI/EOI markers. Reads may split
//! a frame at any byte boundary, so leftover bytes are carried between
//! pushes.

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Upper bound on buffered bytes while hunting for an EOI. A stream that
/// exceeds this without producing a frame is not MJPEG.
const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

/// Stateful MJPEG frame assembler
#[derive(Debug, Default)]
pub struct MjpegAssembler {
    buf: Vec<u8>,
}

impl MjpegAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stream bytes, returning any complete frames.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            // Discard garbage before the next SOI
            let start = match find_marker(&self.buf, &SOI) {
                Some(idx) => idx,
                None => {
                    // Keep a trailing 0xFF in case the SOI is split across reads
                    let keep = usize::from(self.buf.last() == Some(&0xFF));
                    let len = self.buf.len();
                    self.buf.drain(..len - keep);
                    break;
                }
            };
            if start > 0 {
                self.buf.drain(..start);
            }

            let end = match find_marker(&self.buf[2..], &EOI) {
                Some(idx) => 2 + idx + EOI.len(),
                None => {
                    if self.buf.len() > MAX_PENDING_BYTES {
                        tracing::warn!(
                            pending = self.buf.len(),
                            "No frame boundary found, resetting assembler"
                        );
                        self.buf.clear();
                    }
                    break;
                }
            };

            frames.push(self.buf[..end].to_vec());
            self.buf.drain(..end);
        }

        frames
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFF, 0xD8];
        frame.extend_from_slice(body);
        frame.extend_from_slice(&[0xFF, 0xD9]);
        frame
    }

    #[test]
    fn test_single_frame() {
        let mut assembler = MjpegAssembler::new();
        let frame = jpeg(b"hello");
        let out = assembler.push(&frame);
        assert_eq!(out, vec![frame]);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut assembler = MjpegAssembler::new();
        let a = jpeg(b"one");
        let b = jpeg(b"two");
        let mut chunk = a.clone();
        chunk.extend_from_slice(&b);

        let out = assembler.push(&chunk);
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let mut assembler = MjpegAssembler::new();
        let frame = jpeg(b"split-me");

        for split in 1..frame.len() - 1 {
            let mut collected = Vec::new();
            collected.extend(assembler.push(&frame[..split]));
            collected.extend(assembler.push(&frame[split..]));
            assert_eq!(collected, vec![frame.clone()], "split at {}", split);
        }
    }

    #[test]
    fn test_leading_garbage_discarded() {
        let mut assembler = MjpegAssembler::new();
        let frame = jpeg(b"payload");
        let mut chunk = vec![0x00, 0x01, 0xFF, 0x00];
        chunk.extend_from_slice(&frame);

        let out = assembler.push(&chunk);
        assert_eq!(out, vec![frame]);
    }

    #[test]
    fn test_incomplete_frame_yields_nothing() {
        let mut assembler = MjpegAssembler::new();
        let frame = jpeg(b"pending");
        let out = assembler.push(&frame[..frame.len() - 1]);
        assert!(out.is_empty());

        // Completing it later flushes the frame
        let out = assembler.push(&frame[frame.len() - 1..]);
        assert_eq!(out, vec![frame]);
    }

    #[test]
    fn test_soi_split_across_reads() {
        let mut assembler = MjpegAssembler::new();
        let frame = jpeg(b"x");

        assert!(assembler.push(&[0xFF]).is_empty());
        let out = assembler.push(&frame[1..]);
        assert_eq!(out, vec![frame]);
    }
}
