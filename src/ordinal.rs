/// Dense ordinal index generator.
///
/// Hands out `0, 1, 2, ...` in order. Each registry owns its own generator,
/// so two registries never interfere and a fresh one always starts at zero.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ordinal {
    next: usize,
}

impl Ordinal {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Return the next index and advance the generator.
    pub fn next_index(&mut self) -> usize {
        let idx = self.next;
        self.next += 1;
        idx
    }

    /// Number of indices handed out so far.
    pub fn issued(&self) -> usize {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense_and_start_at_zero() {
        let mut ord = Ordinal::new();
        let idxs: Vec<_> = (0..4).map(|_| ord.next_index()).collect();
        assert_eq!(idxs, vec![0, 1, 2, 3]);
        assert_eq!(ord.issued(), 4);
    }

    #[test]
    fn generators_are_independent() {
        let mut a = Ordinal::new();
        let mut b = Ordinal::new();
        a.next_index();
        a.next_index();
        assert_eq!(b.next_index(), 0);
        assert_eq!(a.next_index(), 2);
    }
}
