use std::collections::VecDeque;

/// FIFO that slices fixed-size, overlapping analysis windows.
///
/// Incoming blocks are appended with [`push`](Self::push). While at least
/// `window_size` samples are buffered, [`try_take_window`](Self::try_take_window)
/// copies the oldest `window_size` samples into a preallocated frame without
/// consuming them; [`commit_hop`](Self::commit_hop) then discards the front
/// `hop_size` samples so consecutive windows share `window_size - hop_size`
/// samples. Samples are never dropped.
pub struct OverlapWindowBuffer {
    fifo: VecDeque<f32>,
    frame: Vec<f32>,
    window_size: usize,
    hop_size: usize,
    /// Samples consumed so far; the start index of the next window.
    frames_processed: u64,
}

impl OverlapWindowBuffer {
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        assert!(hop_size > 0 && hop_size < window_size, "hop must be in 1..window");
        Self {
            fifo: VecDeque::with_capacity(window_size * 2),
            frame: vec![0.0; window_size],
            window_size,
            hop_size,
            frames_processed: 0,
        }
    }

    pub fn push(&mut self, samples: &[f32]) {
        self.fifo.extend(samples.iter().copied());
    }

    /// The oldest `window_size` samples, or `None` if not enough are buffered.
    pub fn try_take_window(&mut self) -> Option<&[f32]> {
        if self.fifo.len() < self.window_size {
            return None;
        }
        for (dst, src) in self.frame.iter_mut().zip(self.fifo.iter()) {
            *dst = *src;
        }
        Some(&self.frame)
    }

    /// Consume the front hop after a window has been analyzed.
    pub fn commit_hop(&mut self) {
        let n = self.hop_size.min(self.fifo.len());
        self.fifo.drain(..n);
        self.frames_processed += n as u64;
    }

    /// Absolute sample index of the first sample of the next window.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn buffered(&self) -> usize {
        self.fifo.len()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, n: usize) -> Vec<f32> {
        (start..start + n).map(|i| i as f32).collect()
    }

    #[test]
    fn test_no_window_until_full() {
        let mut buf = OverlapWindowBuffer::new(8, 4);
        buf.push(&ramp(0, 7));
        assert!(buf.try_take_window().is_none());
        buf.push(&ramp(7, 1));
        assert_eq!(buf.try_take_window().unwrap(), ramp(0, 8).as_slice());
    }

    #[test]
    fn test_take_does_not_consume() {
        let mut buf = OverlapWindowBuffer::new(8, 4);
        buf.push(&ramp(0, 8));
        let first = buf.try_take_window().unwrap().to_vec();
        let again = buf.try_take_window().unwrap().to_vec();
        assert_eq!(first, again);
        assert_eq!(buf.buffered(), 8);
    }

    #[test]
    fn test_consecutive_windows_share_overlap() {
        let (n, h) = (16, 6);
        let mut buf = OverlapWindowBuffer::new(n, h);
        buf.push(&ramp(0, 64));

        let mut windows = Vec::new();
        while let Some(w) = buf.try_take_window() {
            windows.push(w.to_vec());
            buf.commit_hop();
        }
        assert!(windows.len() >= 3);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].len(), n);
            assert_eq!(&pair[0][h..], &pair[1][..n - h], "windows must share N - H samples");
        }
    }

    #[test]
    fn test_large_push_drains_multiple_windows() {
        let mut buf = OverlapWindowBuffer::new(8, 4);
        buf.push(&ramp(0, 20));
        let mut count = 0;
        while buf.try_take_window().is_some() {
            buf.commit_hop();
            count += 1;
        }
        // windows start at 0, 4, 8, 12
        assert_eq!(count, 4);
        assert_eq!(buf.frames_processed(), 16);
        assert_eq!(buf.buffered(), 4);
    }

    #[test]
    fn test_window_boundaries_independent_of_block_size() {
        let mut a = OverlapWindowBuffer::new(8, 4);
        let mut b = OverlapWindowBuffer::new(8, 4);
        let data = ramp(0, 30);
        a.push(&data);
        let mut wa = Vec::new();
        while let Some(w) = a.try_take_window() {
            wa.push(w.to_vec());
            a.commit_hop();
        }
        let mut wb = Vec::new();
        for chunk in data.chunks(3) {
            b.push(chunk);
            while let Some(w) = b.try_take_window() {
                wb.push(w.to_vec());
                b.commit_hop();
            }
        }
        assert_eq!(wa, wb);
    }
}
