use std::rc::Rc;

use crate::error::{Error, Result};

/// An ordered list of immutable byte pages plus a read cursor, shared by
/// `ByteStream` and `BitStream`.
///
/// Pages are reference-counted so cloning the cursor (what `tee()` needs) is
/// a pointer-copy per page, never a byte copy. Because the page list itself
/// is owned per-instance (not shared through `Rc<RefCell<_>>`), a plain
/// `#[derive(Clone)]` already gives the "pages pushed after the tee are
/// invisible to the clone" contract: the clone's `Vec` is a separate
/// allocation that the original's later `push` never touches.
#[derive(Debug, Clone, Default)]
pub(crate) struct PagedBytes {
    pages: Vec<Rc<[u8]>>,
    page_idx: usize,
    byte_idx: usize,
    consumed: u64,
}

impl PagedBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_page(data: impl Into<Rc<[u8]>>) -> Self {
        let mut this = Self::new();
        this.push(data);
        this
    }

    pub fn push(&mut self, data: impl Into<Rc<[u8]>>) {
        let page: Rc<[u8]> = data.into();

        if !page.is_empty() {
            self.pages.push(page);
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Number of bytes currently buffered but not yet consumed.
    pub fn remaining(&self) -> usize {
        let mut total = self.pages.get(self.page_idx).map_or(0, |p| p.len() - self.byte_idx);

        for page in self.pages.iter().skip(self.page_idx + 1) {
            total += page.len();
        }

        total
    }

    pub fn at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Peek `ahead` bytes past the cursor without consuming.
    pub fn peek_byte(&self, ahead: usize) -> Option<u8> {
        let mut page_idx = self.page_idx;
        let mut byte_idx = self.byte_idx;
        let mut left = ahead;

        loop {
            let page = self.pages.get(page_idx)?;

            if byte_idx >= page.len() {
                page_idx += 1;
                byte_idx = 0;
                continue;
            }

            if left == 0 {
                return Some(page[byte_idx]);
            }

            let in_page = page.len() - byte_idx;

            if left < in_page {
                return Some(page[byte_idx + left]);
            }

            left -= in_page;
            page_idx += 1;
            byte_idx = 0;
        }
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        loop {
            match self.pages.get(self.page_idx) {
                None => return Err(Error::Overrun { needed: 1 }),
                Some(page) if self.byte_idx >= page.len() => {
                    self.page_idx += 1;
                    self.byte_idx = 0;
                }
                Some(page) => {
                    let byte = page[self.byte_idx];
                    self.byte_idx += 1;
                    self.consumed += 1;
                    return Ok(byte);
                }
            }
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.remaining() < n {
            return Err(Error::Overrun { needed: n - self.remaining() });
        }

        let mut out = Vec::with_capacity(n);

        for _ in 0..n {
            out.push(self.read_byte()?);
        }

        Ok(out)
    }

    pub fn peek_bytes(&self, n: usize) -> Result<Vec<u8>> {
        if self.remaining() < n {
            return Err(Error::Overrun { needed: n - self.remaining() });
        }

        Ok((0..n).map(|i| self.peek_byte(i).expect("checked remaining() above")).collect())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(Error::Overrun { needed: n - self.remaining() });
        }

        for _ in 0..n {
            self.read_byte()?;
        }

        Ok(())
    }

    pub fn tee(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_read_across_pages() {
        let mut p = PagedBytes::from_page(vec![1u8, 2, 3]);
        p.push(vec![4u8, 5]);

        assert_eq!(p.read_bytes(4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(p.remaining(), 1);
        assert_eq!(p.consumed(), 4);
    }

    #[test]
    fn tee_does_not_see_later_pushes() {
        let mut p = PagedBytes::from_page(vec![1u8, 2, 3]);
        let clone = p.tee();

        p.push(vec![4u8, 5]);

        assert_eq!(p.remaining(), 5);
        assert_eq!(clone.remaining(), 3);
    }

    #[test]
    fn tee_reads_do_not_move_original_cursor() {
        let mut p = PagedBytes::from_page(vec![1u8, 2, 3]);
        let mut clone = p.tee();

        clone.read_bytes(2).unwrap();

        assert_eq!(clone.consumed(), 2);
        assert_eq!(p.consumed(), 0);
    }

    #[test]
    fn overrun_is_recoverable_signal() {
        let mut p = PagedBytes::from_page(vec![1u8]);
        let err = p.read_bytes(3).unwrap_err();

        assert!(err.is_overrun());
    }
}
