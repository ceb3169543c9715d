//! Two-slot arena holding the live and shadow sessions of a source

/// Slot index inside a [`DecoderArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot(usize);

/// Owns both sessions of a source and tracks which one is live.
///
/// Swapping exchanges the two roles without moving any session. A session
/// lent to a prefetch worker leaves its slot empty until it is restored.
#[derive(Debug)]
pub struct DecoderArena<S> {
    slots: [Option<S>; 2],
    live: Slot,
    shadow: Slot,
}

impl<S> DecoderArena<S> {
    pub fn new(live: S, shadow: S) -> Self {
        Self {
            slots: [Some(live), Some(shadow)],
            live: Slot(0),
            shadow: Slot(1),
        }
    }

    pub fn live(&self) -> Option<&S> {
        self.slots[self.live.0].as_ref()
    }

    pub fn live_mut(&mut self) -> Option<&mut S> {
        self.slots[self.live.0].as_mut()
    }

    /// Lends the shadow session out
    pub fn take_shadow(&mut self) -> Option<S> {
        self.slots[self.shadow.0].take()
    }

    /// Returns a lent session to the shadow slot
    pub fn restore_shadow(&mut self, session: S) {
        self.slots[self.shadow.0] = Some(session);
    }

    /// Exchanges the live and shadow roles
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.live, &mut self.shadow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_exchanges_roles() {
        let mut arena = DecoderArena::new("a", "b");
        let live = arena.live;
        arena.swap();
        assert_eq!(arena.shadow, live);
        assert_eq!(arena.live(), Some(&"b"));
        arena.swap();
        assert_eq!(arena.live(), Some(&"a"));
    }

    #[test]
    fn test_lend_and_restore() {
        let mut arena = DecoderArena::new(1, 2);
        let lent = arena.take_shadow().unwrap();
        assert_eq!(arena.take_shadow(), None);

        arena.restore_shadow(lent + 10);
        arena.swap();
        assert_eq!(arena.live(), Some(&12));
        assert_eq!(arena.take_shadow(), Some(1));
    }
}
