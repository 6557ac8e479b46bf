// crates/filtergraph-core/src/command.rs
//
// Filter command queue: commands are applied FIFO against their scheduled
// time. A `VecDeque` gives that ordering directly.

use std::collections::VecDeque;

#[derive(Clone, Debug)]
pub struct FilterCommand {
    /// Wall time (seconds, `av_q2d`-style) at which the command applies.
    pub time: f64,
    pub command: String,
    pub arg: String,
    pub flags: i32,
}

#[derive(Default)]
pub struct CommandQueue {
    queue: VecDeque<FilterCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    pub fn push(&mut self, cmd: FilterCommand) {
        self.queue.push_back(cmd);
    }

    pub fn front(&self) -> Option<&FilterCommand> {
        self.queue.front()
    }

    pub fn pop_front(&mut self) -> Option<FilterCommand> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn drain_all(&mut self) -> Vec<FilterCommand> {
        self.queue.drain(..).collect()
    }
}
