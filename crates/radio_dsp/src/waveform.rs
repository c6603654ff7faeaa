//! Fixed-length waveform ring: pushes each mix block in and hands readers
//! a torn-free copy.

/// Per-channel fixed-length ring of the most recent samples. Reads return a
/// snapshot by value, so a concurrent writer can never leave a reader with
/// a torn array.
pub struct WaveformRing {
    channels: usize,
    len: usize,
    buffers: Vec<Vec<f32>>,
    write_pos: usize,
    filled: usize,
}

impl WaveformRing {
    /// `len` is the number of samples per channel (default 1024).
    pub fn new(channels: usize, len: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            len: len.max(1),
            buffers: vec![vec![0.0; len.max(1)]; channels],
            write_pos: 0,
            filled: 0,
        }
    }

    pub fn push_block(&mut self, block: &[f32]) {
        for frame in block.chunks_exact(self.channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                self.buffers[ch][self.write_pos] = sample;
            }
            self.write_pos = (self.write_pos + 1) % self.len;
            self.filled = (self.filled + 1).min(self.len);
        }
    }

    /// Returns a copy of channel `ch`'s ring in chronological order (oldest
    /// first). Panics if `ch >= channels`.
    pub fn snapshot(&self, ch: usize) -> Vec<f32> {
        let buf = &self.buffers[ch];
        if self.filled < self.len {
            let mut out = vec![0.0; self.len - self.filled];
            out.extend_from_slice(&buf[..self.filled]);
            out
        } else {
            let mut out = Vec::with_capacity(self.len);
            out.extend_from_slice(&buf[self.write_pos..]);
            out.extend_from_slice(&buf[..self.write_pos]);
            out
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn reset(&mut self) {
        for buf in &mut self.buffers {
            buf.iter_mut().for_each(|s| *s = 0.0);
        }
        self.write_pos = 0;
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_chronological_order() {
        let mut ring = WaveformRing::new(1, 4);
        ring.push_block(&[1.0]);
        ring.push_block(&[2.0]);
        ring.push_block(&[3.0]);
        assert_eq!(ring.snapshot(0), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn wraps_once_full() {
        let mut ring = WaveformRing::new(1, 3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            ring.push_block(&[v]);
        }
        assert_eq!(ring.snapshot(0), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn stereo_channels_are_independent() {
        let mut ring = WaveformRing::new(2, 2);
        ring.push_block(&[1.0, -1.0]);
        ring.push_block(&[2.0, -2.0]);
        assert_eq!(ring.snapshot(0), vec![1.0, 2.0]);
        assert_eq!(ring.snapshot(1), vec![-1.0, -2.0]);
    }
}
