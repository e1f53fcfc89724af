use super::IteratorBackend;

/// Backend over an in-memory list
#[derive(Debug, Clone)]
pub struct SimpleIteratorBackend<T> {
    items: Vec<T>,
    /// Number of successful `next()` calls; `items.len() + 1` once exhausted
    position: usize,
    closed: bool,
}

impl<T> SimpleIteratorBackend<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            position: 0,
            closed: false,
        }
    }
}

impl<T: Clone + Default + Send> IteratorBackend<T> for SimpleIteratorBackend<T> {
    fn next(&mut self) -> bool {
        if self.closed || self.position > self.items.len() {
            return false;
        }
        self.position += 1;
        self.position <= self.items.len()
    }

    fn current(&self) -> T {
        if self.closed || self.position == 0 {
            return T::default();
        }
        self.items.get(self.position - 1).cloned().unwrap_or_default()
    }

    fn close(&mut self) {
        self.closed = true;
        self.items.clear();
    }
}

impl<T> From<Vec<T>> for SimpleIteratorBackend<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_is_sticky() {
        let mut backend = SimpleIteratorBackend::new(vec![10, 20]);
        assert_eq!(backend.current(), 0);
        assert!(backend.next());
        assert_eq!(backend.current(), 10);
        assert!(backend.next());
        assert!(!backend.next());
        assert_eq!(backend.current(), 0);
        assert!(!backend.next());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut backend = SimpleIteratorBackend::new(vec![1]);
        backend.close();
        backend.close();
        assert!(!backend.next());
        assert_eq!(backend.current(), 0);
    }
}
