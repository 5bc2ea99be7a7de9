//! Address translation handshake.
//!
//! Whatever needs an address translated places a request here, the translation unit peeks at the
//! request and supplies a result, and the requester takes the result. The requester never learns
//! which translation scheme produced it.
//!
//! Two disciplines share the same queues:
//!
//! - [`request`](TranslationState::request) allows a single outstanding request, and refuses a
//!   new one until the previous result has been taken.
//! - [`enqueue`](TranslationState::enqueue) and [`enqueue_split`](TranslationState::enqueue_split)
//!   queue any number of requests for multi-element accesses. Results come back in request order,
//!   and everything must be consumed by the end of the step that owns the access (see
//!   [`ensure_drained`](TranslationState::ensure_drained)).

use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TranslationRequest {
    pub vaddr: u64,
    /// Number of bytes covered by the access. `0` marks an absent request.
    pub size: usize,
}

impl TranslationRequest {
    pub fn new(vaddr: u64, size: usize) -> Self {
        Self { vaddr, size }
    }

    pub fn is_valid(&self) -> bool {
        self.size != 0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TranslationResult {
    pub vaddr: u64,
    pub paddr: u64,
    /// Number of bytes covered by the translation. `0` marks an absent result.
    pub size: usize,
}

impl TranslationResult {
    pub fn is_valid(&self) -> bool {
        self.size != 0
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum HandshakeError {
    #[error("translation requested for {vaddr:#x} while another is outstanding")]
    Outstanding { vaddr: u64 },
    #[error("translation requested for {vaddr:#x} with size 0")]
    EmptyRequest { vaddr: u64 },
    #[error("no translation request is pending")]
    NoRequest,
    #[error("no translation result is available")]
    NoResult,
    #[error("request of {size} bytes cannot be split at {at}")]
    BadSplit { size: usize, at: usize },
    #[error("{requests} request(s) and {results} result(s) left unconsumed")]
    NotDrained { requests: usize, results: usize },
}

#[derive(Debug, Clone, Default)]
pub struct TranslationState {
    requests: VecDeque<TranslationRequest>,
    results: VecDeque<TranslationResult>,
}

impl TranslationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a single request. Fails if any request or result is still outstanding.
    pub fn request(&mut self, vaddr: u64, size: usize) -> Result<(), HandshakeError> {
        if !self.requests.is_empty() || !self.results.is_empty() {
            return Err(HandshakeError::Outstanding { vaddr });
        }
        self.enqueue(vaddr, size)
    }

    /// Appends a request to the queue, behind any requests already pending.
    pub fn enqueue(&mut self, vaddr: u64, size: usize) -> Result<(), HandshakeError> {
        let request = TranslationRequest::new(vaddr, size);
        if !request.is_valid() {
            return Err(HandshakeError::EmptyRequest { vaddr });
        }
        self.requests.push_back(request);
        Ok(())
    }

    /// Appends a request, split into two adjacent requests if it crosses a `page_size` boundary.
    ///
    /// `page_size` must be a power of two. Returns the number of requests enqueued.
    pub fn enqueue_split(
        &mut self,
        vaddr: u64,
        size: usize,
        page_size: u64,
    ) -> Result<usize, HandshakeError> {
        match bytes_before_boundary(vaddr, size, page_size) {
            Some(first) => {
                self.enqueue(vaddr, first)?;
                self.enqueue(vaddr.wrapping_add(first as u64), size - first)?;
                Ok(2)
            }
            None => self.enqueue(vaddr, size).map(|()| 1),
        }
    }

    /// Returns the oldest pending request.
    pub fn peek_request(&self) -> Result<&TranslationRequest, HandshakeError> {
        self.requests.front().ok_or(HandshakeError::NoRequest)
    }

    pub fn has_request(&self) -> bool {
        !self.requests.is_empty()
    }

    /// Replaces the oldest pending request by two adjacent requests, the first covering `first`
    /// bytes. Used by the translation unit when it discovers the access crosses a page.
    pub fn split_front(&mut self, first: usize) -> Result<(), HandshakeError> {
        let request = *self.peek_request()?;
        if first == 0 || first >= request.size {
            return Err(HandshakeError::BadSplit {
                size: request.size,
                at: first,
            });
        }
        self.requests[0].size = first;
        self.requests.insert(
            1,
            TranslationRequest::new(request.vaddr.wrapping_add(first as u64), request.size - first),
        );
        Ok(())
    }

    /// Resolves the oldest pending request, removing it from the queue.
    pub fn supply_result(&mut self, paddr: u64, size: usize) -> Result<(), HandshakeError> {
        let request = self.requests.pop_front().ok_or(HandshakeError::NoRequest)?;
        self.results.push_back(TranslationResult {
            vaddr: request.vaddr,
            paddr,
            size,
        });
        Ok(())
    }

    /// Takes the oldest available result.
    pub fn take_result(&mut self) -> Result<TranslationResult, HandshakeError> {
        self.results.pop_front().ok_or(HandshakeError::NoResult)
    }

    pub fn has_result(&self) -> bool {
        !self.results.is_empty()
    }

    pub fn ensure_drained(&self) -> Result<(), HandshakeError> {
        if self.requests.is_empty() && self.results.is_empty() {
            Ok(())
        } else {
            Err(HandshakeError::NotDrained {
                requests: self.requests.len(),
                results: self.results.len(),
            })
        }
    }

    /// Drops everything in flight. Used when an instruction is abandoned by a trap.
    pub fn clear(&mut self) {
        self.requests.clear();
        self.results.clear();
    }
}

/// If `[vaddr, vaddr + size)` crosses a `page_size` boundary, returns the number of bytes in front
/// of the boundary.
pub fn bytes_before_boundary(vaddr: u64, size: usize, page_size: u64) -> Option<usize> {
    let offset = vaddr & (page_size - 1);
    let room = page_size - offset;
    ((size as u64) > room).then_some(room as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_request_cycle() {
        let mut state = TranslationState::new();
        state.request(0x1000, 4).unwrap();
        assert_eq!(TranslationRequest::new(0x1000, 4), *state.peek_request().unwrap());
        state.supply_result(0x8000_1000, 4).unwrap();
        assert!(!state.has_request());
        let result = state.take_result().unwrap();
        assert_eq!(0x1000, result.vaddr);
        assert_eq!(0x8000_1000, result.paddr);
        assert!(result.is_valid());
        state.ensure_drained().unwrap();
        state.request(0x2000, 8).unwrap();
    }

    #[test]
    fn test_double_request_fails() {
        let mut state = TranslationState::new();
        state.request(0x1000, 4).unwrap();
        assert_eq!(
            Err(HandshakeError::Outstanding { vaddr: 0x2000 }),
            state.request(0x2000, 4)
        );
        state.supply_result(0x1000, 4).unwrap();
        // The result has not been taken yet.
        assert!(state.request(0x2000, 4).is_err());
        state.take_result().unwrap();
        assert!(state.request(0x2000, 4).is_ok());
    }

    #[test]
    fn test_take_before_supply_fails() {
        let mut state = TranslationState::new();
        assert_eq!(Err(HandshakeError::NoResult), state.take_result());
        state.request(0x1000, 4).unwrap();
        assert_eq!(Err(HandshakeError::NoResult), state.take_result());
    }

    #[test]
    fn test_peek_and_supply_without_request_fail() {
        let mut state = TranslationState::new();
        assert_eq!(Err(HandshakeError::NoRequest), state.peek_request().copied());
        assert_eq!(Err(HandshakeError::NoRequest), state.supply_result(0, 4));
    }

    #[test]
    fn test_zero_size_is_absent() {
        let mut state = TranslationState::new();
        assert!(!TranslationRequest::new(0x10, 0).is_valid());
        assert_eq!(
            Err(HandshakeError::EmptyRequest { vaddr: 0x10 }),
            state.request(0x10, 0)
        );
    }

    #[test]
    fn test_enqueue_split_at_page_boundary() {
        let mut state = TranslationState::new();
        assert_eq!(Ok(2), state.enqueue_split(0x0FFE, 8, 4096));
        let first = *state.peek_request().unwrap();
        state.supply_result(0x8000_0FFE, first.size).unwrap();
        let second = *state.peek_request().unwrap();
        assert_eq!(TranslationRequest::new(0x0FFE, 2), first);
        assert_eq!(TranslationRequest::new(0x1000, 6), second);
        assert_eq!(8, first.size + second.size);
        assert_eq!(first.vaddr + first.size as u64, second.vaddr);
    }

    #[test]
    fn test_enqueue_split_within_page() {
        let mut state = TranslationState::new();
        assert_eq!(Ok(1), state.enqueue_split(0x0FF8, 8, 4096));
        assert_eq!(Ok(1), state.enqueue_split(0x1000, 4096, 4096));
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut state = TranslationState::new();
        for i in 0..4 {
            state.enqueue(0x100 * i, 4).unwrap();
        }
        while let Ok(request) = state.peek_request().copied() {
            state.supply_result(request.vaddr + 0x8000, request.size).unwrap();
        }
        assert!(state.ensure_drained().is_err());
        for i in 0..4 {
            assert_eq!(0x100 * i + 0x8000, state.take_result().unwrap().paddr);
        }
        state.ensure_drained().unwrap();
    }

    #[test]
    fn test_split_front() {
        let mut state = TranslationState::new();
        state.request(0x1FFC, 8).unwrap();
        state.enqueue(0x3000, 4).unwrap();
        state.split_front(4).unwrap();
        assert_eq!(TranslationRequest::new(0x1FFC, 4), *state.peek_request().unwrap());
        state.supply_result(0, 4).unwrap();
        assert_eq!(TranslationRequest::new(0x2000, 4), *state.peek_request().unwrap());
        state.supply_result(0, 4).unwrap();
        assert_eq!(TranslationRequest::new(0x3000, 4), *state.peek_request().unwrap());
        assert!(state.split_front(4).is_err());
        assert!(state.split_front(0).is_err());
    }
}
