//! Readiness latches
//!
//! A [`StateSource`] is owned by the subsystem that produces the
//! condition. Everyone else holds a [`State`], which can only observe and
//! wait. Waiting registers a waker on every underlying source, so no task
//! ever polls a flag.

use alloc::vec::Vec;
use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Poll, Waker};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::MultiWakerRegistration;
use embassy_time::{with_timeout, Duration};

/// Waiters tracked per source before older ones are woken early
pub const MAX_WAITERS: usize = 8;

struct Latch {
    set: bool,
    wakers: MultiWakerRegistration<MAX_WAITERS>,
}

/// Producer side of a readiness latch
pub struct StateSource {
    latch: Mutex<CriticalSectionRawMutex, RefCell<Latch>>,
}

impl Default for StateSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSource {
    /// Create an unset source
    pub const fn new() -> Self {
        Self {
            latch: Mutex::new(RefCell::new(Latch {
                set: false,
                wakers: MultiWakerRegistration::new(),
            })),
        }
    }

    /// Set the latch
    ///
    /// Returns whether the latch changed. Setting a set latch does nothing.
    pub fn set(&self) -> bool {
        self.transition(true)
    }

    /// Clear the latch
    ///
    /// Only the producing subsystem calls this, when its condition is lost.
    pub fn reset(&self) -> bool {
        self.transition(false)
    }

    pub fn is_set(&self) -> bool {
        self.latch.lock(|latch| latch.borrow().set)
    }

    /// Read-only handle
    pub fn state(&self) -> State<'_> {
        State::Source(self)
    }

    fn transition(&self, set: bool) -> bool {
        self.latch.lock(|latch| {
            let mut latch = latch.borrow_mut();
            if latch.set == set {
                return false;
            }
            latch.set = set;
            latch.wakers.wake();
            true
        })
    }

    fn register(&self, waker: &Waker) {
        self.latch
            .lock(|latch| latch.borrow_mut().wakers.register(waker));
    }
}

/// Observer side of one or more latches
#[derive(Clone)]
pub enum State<'a> {
    Source(&'a StateSource),
    /// Set when every member is set, and when there are no members
    AllOf(Vec<State<'a>>),
    /// Set when any member is set, never when there are no members
    AnyOf(Vec<State<'a>>),
}

impl<'a> From<&'a StateSource> for State<'a> {
    fn from(source: &'a StateSource) -> Self {
        State::Source(source)
    }
}

impl<'a> State<'a> {
    /// Combine states into one that is set when all of them are
    pub fn all_of(states: impl IntoIterator<Item = State<'a>>) -> Self {
        State::AllOf(states.into_iter().collect())
    }

    /// Combine states into one that is set when any of them is
    pub fn any_of(states: impl IntoIterator<Item = State<'a>>) -> Self {
        State::AnyOf(states.into_iter().collect())
    }

    pub fn is_set(&self) -> bool {
        match self {
            State::Source(source) => source.is_set(),
            State::AllOf(states) => states.iter().all(State::is_set),
            State::AnyOf(states) => states.iter().any(State::is_set),
        }
    }

    fn register(&self, waker: &Waker) {
        match self {
            State::Source(source) => source.register(waker),
            State::AllOf(states) | State::AnyOf(states) => {
                states.iter().for_each(|state| state.register(waker))
            }
        }
    }

    /// Wait until the state is set
    pub async fn wait_set(&self) {
        poll_fn(|cx| {
            if self.is_set() {
                return Poll::Ready(());
            }
            self.register(cx.waker());
            // A member may have changed between the check and registration
            if self.is_set() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// Wait until the state is set or `timeout` elapses
    ///
    /// Returns `true` when set, `false` on timeout.
    pub async fn wait_set_timeout(&self, timeout: Duration) -> bool {
        with_timeout(timeout, self.wait_set()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Timer;
    use proptest::prelude::*;

    #[test]
    fn test_set_is_idempotent() {
        let source = StateSource::new();
        assert!(!source.is_set());
        assert!(source.set());
        assert!(!source.set());
        assert!(source.is_set());
        assert!(source.reset());
        assert!(!source.reset());
    }

    #[test]
    fn test_wait_returns_immediately_when_set() {
        let source = StateSource::new();
        source.set();
        block_on(source.state().wait_set());
        assert!(block_on(source.state().wait_set_timeout(Duration::from_millis(1))));
    }

    #[test]
    fn test_waiter_wakes_on_set() {
        let source = StateSource::new();
        let state = source.state();
        let (set, ()) = block_on(join(
            state.wait_set_timeout(Duration::from_secs(5)),
            async {
                Timer::after_millis(10).await;
                source.set();
            },
        ));
        assert!(set);
    }

    #[test]
    fn test_wait_times_out() {
        let source = StateSource::new();
        assert!(!block_on(
            source.state().wait_set_timeout(Duration::from_millis(20))
        ));
    }

    #[test]
    fn test_all_of_waits_for_every_member() {
        let network = StateSource::new();
        let clock = StateSource::new();
        let ready = State::all_of([network.state(), clock.state()]);

        let (set, ()) = block_on(join(ready.wait_set_timeout(Duration::from_secs(5)), async {
            network.set();
            Timer::after_millis(10).await;
            assert!(!ready.is_set());
            clock.set();
        }));
        assert!(set);
    }

    #[test]
    fn test_any_of_wakes_on_first_member() {
        let connecting = StateSource::new();
        let portal = StateSource::new();
        let busy = State::any_of([connecting.state(), portal.state()]);

        let (set, ()) = block_on(join(busy.wait_set_timeout(Duration::from_secs(5)), async {
            Timer::after_millis(10).await;
            portal.set();
        }));
        assert!(set);
    }

    #[test]
    fn test_empty_combinations() {
        assert!(State::all_of(vec![]).is_set());
        assert!(!State::any_of(vec![]).is_set());
    }

    #[test]
    fn test_nested_combinations() {
        let a = StateSource::new();
        let b = StateSource::new();
        let c = StateSource::new();
        let state = State::all_of([a.state(), State::any_of([b.state(), c.state()])]);
        a.set();
        assert!(!state.is_set());
        c.set();
        assert!(state.is_set());
        a.reset();
        assert!(!state.is_set());
    }

    proptest! {
        #[test]
        fn test_combinations_track_members(ops in prop::collection::vec((any::<bool>(), any::<bool>()), 0..64)) {
            let a = StateSource::new();
            let b = StateSource::new();
            let all = State::all_of([a.state(), b.state()]);
            let any = State::any_of([a.state(), b.state()]);

            for (first, set) in ops {
                let source = if first { &a } else { &b };
                if set {
                    source.set();
                } else {
                    source.reset();
                }
                prop_assert_eq!(all.is_set(), a.is_set() && b.is_set());
                prop_assert_eq!(any.is_set(), a.is_set() || b.is_set());
            }
        }
    }
}
