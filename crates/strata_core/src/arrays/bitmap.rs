/// An LSB ordered bitmap.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    len: usize,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn with_capacity(cap: usize) -> Self {
        Bitmap {
            len: 0,
            data: Vec::with_capacity(cap.div_ceil(8)),
        }
    }

    pub fn new_with_all_true(len: usize) -> Self {
        Bitmap {
            len,
            data: vec![u8::MAX; len.div_ceil(8)],
        }
    }

    /// Get the number of bits being tracked by this bitmap.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_trues(&self) -> usize {
        (0..self.len).filter(|&idx| self.value(idx)).count()
    }

    pub fn is_all_true(&self) -> bool {
        self.count_trues() == self.len
    }

    /// Push a value onto the end of the bitmap.
    pub fn push(&mut self, val: bool) {
        if self.len == self.data.len() * 8 {
            self.data.push(0);
        }
        let idx = self.len;
        self.len += 1;
        self.set_unchecked(idx, val);
    }

    /// Get the value at index.
    ///
    /// Panics if index is out of bounds.
    #[inline]
    pub fn value(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        let byte = self.data[idx >> 3];
        (byte >> (idx & 7)) & 1 != 0
    }

    /// Set a bit at index.
    #[inline]
    pub fn set_unchecked(&mut self, idx: usize, val: bool) {
        if val {
            self.data[idx >> 3] |= 1 << (idx & 7);
        } else {
            self.data[idx >> 3] &= !(1 << (idx & 7));
        }
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries((0..self.len).map(|idx| self.value(idx)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_count() {
        let mut bm = Bitmap::with_capacity(4);
        for idx in 0..19 {
            bm.push(idx % 3 == 0);
        }

        assert_eq!(19, bm.len());
        assert_eq!(7, bm.count_trues());
        assert!(bm.value(18));
        assert!(!bm.value(17));
    }

    #[test]
    fn all_true_ignores_trailing_bits() {
        let mut bm = Bitmap::new_with_all_true(10);
        assert!(bm.is_all_true());

        bm.set_unchecked(9, false);
        assert!(!bm.is_all_true());
        assert_eq!(9, bm.count_trues());
    }
}
