use std::cell::RefCell;
use std::rc::Rc;

/// Handle of one requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

impl FrameToken {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Host capability for requesting a redraw callback.
///
/// The host answers a `schedule` by eventually calling
/// [`ChartApi::on_frame`](super::ChartApi::on_frame) once.
pub trait FrameScheduler {
    fn schedule(&mut self) -> FrameToken;
    fn cancel(&mut self, token: FrameToken);
}

#[derive(Debug, Default)]
struct ManualSchedulerState {
    next_token: u64,
    requested: usize,
    pending: Vec<FrameToken>,
}

/// Records frame requests; the host (or a test) drives frames explicitly.
///
/// Clones share state, so a handle kept outside the chart observes the
/// requests the chart makes.
#[derive(Debug, Clone, Default)]
pub struct ManualFrameScheduler {
    state: Rc<RefCell<ManualSchedulerState>>,
}

impl ManualFrameScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `schedule` calls so far.
    #[must_use]
    pub fn requested(&self) -> usize {
        self.state.borrow().requested
    }

    #[must_use]
    pub fn pending(&self) -> Vec<FrameToken> {
        self.state.borrow().pending.clone()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.state.borrow().pending.is_empty()
    }

    /// Removes and returns the oldest pending request.
    pub fn take_next(&self) -> Option<FrameToken> {
        let mut state = self.state.borrow_mut();
        if state.pending.is_empty() {
            None
        } else {
            Some(state.pending.remove(0))
        }
    }
}

impl FrameScheduler for ManualFrameScheduler {
    fn schedule(&mut self) -> FrameToken {
        let mut state = self.state.borrow_mut();
        state.next_token += 1;
        state.requested += 1;
        let token = FrameToken::new(state.next_token);
        state.pending.push(token);
        token
    }

    fn cancel(&mut self, token: FrameToken) {
        self.state.borrow_mut().pending.retain(|pending| *pending != token);
    }
}
