use std::collections::VecDeque;

/// Fixed-window simple moving average
///
/// Keeps the last `window` samples; the average of an empty window is 0.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    samples: VecDeque<f32>,
    window: usize,
    sum: f64,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            sum: 0.0,
        }
    }

    /// Push a sample and return the updated average
    pub fn update(&mut self, sample: f32) -> f32 {
        self.samples.push_back(sample);
        self.sum += sample as f64;
        while self.samples.len() > self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old as f64;
            }
        }
        self.average()
    }

    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        (self.sum / self.samples.len() as f64) as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average() {
        let avg = MovingAverage::new(4);
        assert_eq!(avg.average(), 0.0);
        assert!(avg.is_empty());
    }

    #[test]
    fn test_partial_window() {
        let mut avg = MovingAverage::new(4);
        avg.update(2.0);
        assert_eq!(avg.update(4.0), 3.0);
        assert_eq!(avg.len(), 2);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut avg = MovingAverage::new(3);
        for s in [10.0, 1.0, 2.0, 3.0] {
            avg.update(s);
        }
        // 10.0 fell out of the window
        assert_eq!(avg.average(), 2.0);
        assert_eq!(avg.len(), 3);
    }

    #[test]
    fn test_zero_window_is_one() {
        let mut avg = MovingAverage::new(0);
        avg.update(5.0);
        assert_eq!(avg.update(7.0), 7.0);
        assert_eq!(avg.window(), 1);
    }
}
