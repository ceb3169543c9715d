//! Classification of upstream stream handles by media kind

use crate::media::{EsId, StreamKind};
use std::collections::HashMap;

/// Maps the handles a session sends on to their media kind.
///
/// The first handle registered for a kind becomes its primary stream; only
/// primary streams are forwarded downstream.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    kinds: HashMap<EsId, StreamKind>,
    primary: HashMap<StreamKind, EsId>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` as a stream of `kind`
    pub fn register(&mut self, id: EsId, kind: StreamKind) {
        self.kinds.insert(id, kind);
        self.primary.entry(kind).or_insert(id);
    }

    /// Forgets `id`; the next handle of its kind becomes primary
    pub fn unregister(&mut self, id: EsId) {
        let Some(kind) = self.kinds.remove(&id) else {
            return;
        };
        if self.primary.get(&kind) == Some(&id) {
            self.primary.remove(&kind);
            let next = self
                .kinds
                .iter()
                .filter(|(_, k)| **k == kind)
                .map(|(id, _)| *id)
                .min();
            if let Some(next) = next {
                self.primary.insert(kind, next);
            }
        }
    }

    pub fn classify(&self, id: EsId) -> Option<StreamKind> {
        self.kinds.get(&id).copied()
    }

    pub fn is_primary(&self, id: EsId) -> bool {
        self.kinds
            .get(&id)
            .is_some_and(|kind| self.primary.get(kind) == Some(&id))
    }

    /// Primary handle of `kind`
    pub fn primary(&self, kind: StreamKind) -> Option<EsId> {
        self.primary.get(&kind).copied()
    }

    /// Drops every handle; called when a different session is bound
    pub fn reset(&mut self) {
        self.kinds.clear();
        self.primary.clear();
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_stream_of_kind_is_primary() {
        let mut registry = StreamRegistry::new();
        registry.register(EsId(3), StreamKind::Audio);
        registry.register(EsId(1), StreamKind::Video);
        registry.register(EsId(4), StreamKind::Audio);

        assert_eq!(registry.classify(EsId(4)), Some(StreamKind::Audio));
        assert!(registry.is_primary(EsId(3)));
        assert!(!registry.is_primary(EsId(4)));
        assert_eq!(registry.primary(StreamKind::Video), Some(EsId(1)));
        assert_eq!(registry.classify(EsId(9)), None);
    }

    #[test]
    fn test_unregister_promotes_next() {
        let mut registry = StreamRegistry::new();
        registry.register(EsId(3), StreamKind::Audio);
        registry.register(EsId(4), StreamKind::Audio);
        registry.unregister(EsId(3));
        assert!(registry.is_primary(EsId(4)));

        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.primary(StreamKind::Audio), None);
    }
}
