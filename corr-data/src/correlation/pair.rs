/// Running statistics sufficient to derive the Pearson correlation of one symbol pair over the
/// last `window` samples in O(1) per update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairState {
    mean_x: f64,
    mean_y: f64,
    /// Sum of squared deviations of x.
    sxx: f64,
    /// Sum of squared deviations of y.
    syy: f64,
    /// Sum of cross deviations.
    sxy: f64,
    count: usize,
}

impl PairState {
    /// Number of samples currently reflected, capped at the window size.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_warm(&self, window: usize) -> bool {
        self.count >= window
    }

    /// Slide the window: evict `(x_old, y_old)` if the window is full, then insert
    /// `(x_new, y_new)`.
    pub fn update(&mut self, x_new: f64, x_old: f64, y_new: f64, y_old: f64, window: usize) {
        if window >= 2 && self.count >= window {
            self.evict(x_old, y_old);
        }
        self.insert(x_new, y_new);
    }

    fn evict(&mut self, x_old: f64, y_old: f64) {
        let n = self.count as f64;
        let mean_x_next = (n * self.mean_x - x_old) / (n - 1.0);
        let mean_y_next = (n * self.mean_y - y_old) / (n - 1.0);

        self.sxx -= (x_old - self.mean_x) * (x_old - mean_x_next);
        self.syy -= (y_old - self.mean_y) * (y_old - mean_y_next);
        self.sxy -= (x_old - mean_x_next) * (y_old - self.mean_y);

        self.mean_x = mean_x_next;
        self.mean_y = mean_y_next;
        self.count -= 1;
    }

    fn insert(&mut self, x_new: f64, y_new: f64) {
        self.count += 1;
        let n = self.count as f64;

        let dx = x_new - self.mean_x;
        self.mean_x += dx / n;
        self.sxx += dx * (x_new - self.mean_x);

        let dy = y_new - self.mean_y;
        self.mean_y += dy / n;
        self.syy += dy * (y_new - self.mean_y);

        self.sxy += dx * (y_new - self.mean_y);
    }

    /// Pearson correlation coefficient in `[-1, 1]`, or `0.0` when undefined.
    pub fn correlation(&self) -> f64 {
        if self.sxx <= 0.0 || self.syy <= 0.0 {
            return 0.0;
        }

        let correlation = self.sxy / (self.sxx * self.syy).sqrt();
        if correlation.is_finite() {
            correlation.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn pearson(x: &[f64], y: &[f64]) -> f64 {
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;
        let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
        for (x, y) in x.iter().zip(y) {
            sxx += (x - mean_x).powi(2);
            syy += (y - mean_y).powi(2);
            sxy += (x - mean_x) * (y - mean_y);
        }
        if sxx <= 0.0 || syy <= 0.0 {
            0.0
        } else {
            sxy / (sxx * syy).sqrt()
        }
    }

    /// Feed the series through a simulated pair of ring buffers of `window` capacity.
    fn run(x: &[f64], y: &[f64], window: usize) -> PairState {
        let mut state = PairState::default();
        for index in 0..x.len() {
            let (x_old, y_old) = if index >= window {
                (x[index - window], y[index - window])
            } else {
                (0.0, 0.0)
            };
            state.update(x[index], x_old, y[index], y_old, window);
        }
        state
    }

    #[test]
    fn test_static_window_correlation() {
        struct TestCase {
            x: Vec<f64>,
            y: Vec<f64>,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: perfectly correlated
                x: vec![1.0, 2.0, 3.0, 4.0, 5.0],
                y: vec![2.0, 4.0, 6.0, 8.0, 10.0],
                expected: 1.0,
            },
            TestCase {
                // TC1: perfectly anti-correlated
                x: vec![1.0, 2.0, 3.0, 4.0, 5.0],
                y: vec![10.0, 8.0, 6.0, 4.0, 2.0],
                expected: -1.0,
            },
            TestCase {
                // TC2: zero variance
                x: vec![1.0, 2.0, 3.0, 4.0, 5.0],
                y: vec![7.0, 7.0, 7.0, 7.0, 7.0],
                expected: 0.0,
            },
            TestCase {
                // TC3: uncorrelated
                x: vec![1.0, 2.0, 3.0, 4.0, 5.0],
                y: vec![2.0, 1.0, 4.0, 1.0, 2.0],
                expected: pearson(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 1.0, 4.0, 1.0, 2.0]),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let state = run(&test.x, &test.y, test.x.len());
            assert_eq!(state.count(), test.x.len(), "TC{} failed", index);
            assert!(
                (state.correlation() - test.expected).abs() < EPSILON,
                "TC{} failed: {} != {}",
                index,
                state.correlation(),
                test.expected
            );
        }
    }

    #[test]
    fn test_sliding_update_matches_recomputation() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 3.5];
        let y = vec![2.0, 4.0, 6.0, 8.0, 10.0, 1.0];

        let state = run(&x, &y, 5);
        assert_eq!(state.count(), 5);

        let expected = pearson(&x[1..], &y[1..]);
        assert!((state.correlation() - expected).abs() < EPSILON);
    }

    #[test]
    fn test_long_sliding_run_matches_recomputation() {
        const WINDOW: usize = 50;
        let x = (0..2_000)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0 + (i % 7) as f64)
            .collect::<Vec<_>>();
        let y = (0..2_000)
            .map(|i| 50.0 + (i as f64 * 0.37).sin() * 2.0 - (i % 5) as f64 * 0.3)
            .collect::<Vec<_>>();

        let mut state = PairState::default();
        for index in 0..x.len() {
            let (x_old, y_old) = if index >= WINDOW {
                (x[index - WINDOW], y[index - WINDOW])
            } else {
                (0.0, 0.0)
            };
            state.update(x[index], x_old, y[index], y_old, WINDOW);

            if index + 1 >= WINDOW {
                let start = index + 1 - WINDOW;
                let expected = pearson(&x[start..=index], &y[start..=index]);
                assert!(
                    (state.correlation() - expected).abs() < 1e-6,
                    "index {index}: {} != {expected}",
                    state.correlation()
                );
            }
        }
    }

    #[test]
    fn test_warm_up_is_finite() {
        let mut state = PairState::default();
        assert_eq!(state.correlation(), 0.0);

        state.update(1.0, 0.0, 5.0, 0.0, 600);
        assert_eq!(state.correlation(), 0.0);

        state.update(2.0, 0.0, 3.0, 0.0, 600);
        assert!(state.correlation().is_finite());
        assert!(!state.is_warm(600));

        for value in [f64::MAX, f64::MIN, 0.0] {
            state.update(value, 0.0, value, 0.0, 600);
            assert!(state.correlation().is_finite());
            assert!((-1.0..=1.0).contains(&state.correlation()));
        }
    }
}
