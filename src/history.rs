use std::collections::{HashMap, VecDeque};

use crate::model::Sample;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity, per-ticker buffer of recent samples in arrival order.
///
/// Tickers are created lazily on first append and live for as long as the
/// store does. When a ticker's buffer is full the oldest sample is evicted.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    capacity: usize,
    series: HashMap<String, VecDeque<Sample>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be > 0");
        Self {
            capacity,
            series: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&mut self, ticker: &str, sample: Sample) {
        if let Some(buf) = self.series.get_mut(ticker) {
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(sample);
            return;
        }

        let mut buf = VecDeque::with_capacity(self.capacity);
        buf.push_back(sample);
        self.series.insert(ticker.to_string(), buf);
    }

    /// Borrowed view of a ticker's samples. The borrow keeps the store
    /// immutable while the view is alive; use [`HistoryView::to_vec`] to keep
    /// the samples past the next append.
    pub fn snapshot(&self, ticker: &str) -> HistoryView<'_> {
        HistoryView {
            samples: self.series.get(ticker),
        }
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn ticker_count(&self) -> usize {
        self.series.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryView<'a> {
    samples: Option<&'a VecDeque<Sample>>,
}

impl<'a> HistoryView<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a Sample> + 'a {
        self.samples.into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.samples.map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latest(&self) -> Option<&'a Sample> {
        self.samples.and_then(VecDeque::back)
    }

    pub fn to_vec(&self) -> Vec<Sample> {
        self.iter().copied().collect()
    }
}

impl<'a> IntoIterator for HistoryView<'a> {
    type Item = &'a Sample;
    type IntoIter = std::iter::Flatten<std::option::IntoIter<&'a VecDeque<Sample>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter().flatten()
    }
}
