//! Scripted in-memory bus for tests.

use super::Transport;

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    io,
    rc::Rc,
};

#[derive(Default)]
struct State {
    replies: HashMap<(u8, u8), VecDeque<io::Result<Vec<u8>>>>,
    sticky: HashMap<(u8, u8), Vec<u8>>,
    write_errors: VecDeque<io::Error>,
    writes: Vec<(u8, u8, u8)>,
    reads: Vec<(u8, u8, usize)>,
}

/// Cloning shares the script, so a test can keep a handle after giving
/// the bus to a session.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Rc<RefCell<State>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every read of `register` at `address` with `data`.
    pub fn respond(&self, address: u8, register: u8, data: Vec<u8>) {
        self.state
            .borrow_mut()
            .sticky
            .insert((address, register), data);
    }

    /// Queues a one-shot answer, used before any sticky one.
    pub fn respond_once(&self, address: u8, register: u8, reply: io::Result<Vec<u8>>) {
        self.state
            .borrow_mut()
            .replies
            .entry((address, register))
            .or_default()
            .push_back(reply);
    }

    /// Makes the next write fail with `error`.
    pub fn fail_next_write(&self, error: impl Into<io::Error>) {
        self.state.borrow_mut().write_errors.push_back(error.into());
    }

    pub fn writes(&self) -> Vec<(u8, u8, u8)> {
        self.state.borrow().writes.clone()
    }

    pub fn reads(&self) -> Vec<(u8, u8, usize)> {
        self.state.borrow().reads.clone()
    }
}

impl Transport for MockBus {
    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(e) = state.write_errors.pop_front() {
            return Err(e);
        }
        state.writes.push((address, register, value));
        Ok(())
    }

    fn read_block(&mut self, address: u8, register: u8, length: usize) -> io::Result<Vec<u8>> {
        let mut state = self.state.borrow_mut();
        state.reads.push((address, register, length));

        if let Some(reply) = state
            .replies
            .get_mut(&(address, register))
            .and_then(|queue| queue.pop_front())
        {
            return reply;
        }

        state
            .sticky
            .get(&(address, register))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no device"))
    }
}
