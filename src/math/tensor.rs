use serde::{Deserialize, Serialize};

/// Height × width × channels grid of `f64`, stored in HWC order.
///
/// Used for input tensors, convolutional feature maps and their gradients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor3 {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<f64>,
}

impl Tensor3 {
    pub fn zeros(height: usize, width: usize, channels: usize) -> Tensor3 {
        Tensor3 {
            height,
            width,
            channels,
            data: vec![0.0; height * width * channels],
        }
    }

    /// Wraps `data` laid out in HWC order. Returns `None` on a length mismatch.
    pub fn from_vec(height: usize, width: usize, channels: usize, data: Vec<f64>) -> Option<Tensor3> {
        if data.len() != height * width * channels {
            return None;
        }
        Some(Tensor3 { height, width, channels, data })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `(height, width, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    #[inline]
    pub fn index(&self, y: usize, x: usize, c: usize) -> usize {
        (y * self.width + x) * self.channels + c
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, c: usize) -> f64 {
        self.data[self.index(y, x, c)]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, c: usize, value: f64) {
        let i = self.index(y, x, c);
        self.data[i] = value;
    }

    #[inline]
    pub fn add_at(&mut self, y: usize, x: usize, c: usize, value: f64) {
        let i = self.index(y, x, c);
        self.data[i] += value;
    }

    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Tensor3 {
        Tensor3 {
            height: self.height,
            width: self.width,
            channels: self.channels,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Per-channel mean over the spatial dimensions.
    pub fn channel_means(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.channels];
        for pixel in self.data.chunks_exact(self.channels.max(1)) {
            for (sum, &v) in sums.iter_mut().zip(pixel) {
                *sum += v;
            }
        }
        let area = (self.height * self.width) as f64;
        if area > 0.0 {
            sums.iter_mut().for_each(|s| *s /= area);
        }
        sums
    }

    /// Per-channel maximum over the spatial dimensions, with the flat index
    /// of the first position holding it.
    pub fn channel_argmax(&self) -> Vec<(usize, f64)> {
        let mut best = vec![(0usize, f64::NEG_INFINITY); self.channels];
        for (i, &v) in self.data.iter().enumerate() {
            let c = i % self.channels;
            if v > best[c].1 {
                best[c] = (i, v);
            }
        }
        best
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tensor3 {
        // 2x2 grid, 2 channels: channel 0 = [1, 2, 3, 4], channel 1 = [0, -1, 5, 5]
        Tensor3::from_vec(2, 2, 2, vec![1.0, 0.0, 2.0, -1.0, 3.0, 5.0, 4.0, 5.0]).unwrap()
    }

    #[test]
    fn hwc_indexing() {
        let t = sample();
        assert_eq!(t.get(0, 1, 0), 2.0);
        assert_eq!(t.get(1, 0, 1), 5.0);
        assert_eq!(t.shape(), (2, 2, 2));
    }

    #[test]
    fn channel_statistics() {
        let t = sample();
        assert_eq!(t.channel_means(), vec![2.5, 2.25]);
        // first maximum wins on ties
        assert_eq!(t.channel_argmax(), vec![(6, 4.0), (5, 5.0)]);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Tensor3::from_vec(2, 2, 3, vec![0.0; 11]).is_none());
    }
}
