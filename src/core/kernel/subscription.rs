use crate::core::types::Subscription;

/// Active topics of one connection, kept for replay after reconnects
///
/// Set semantics with insertion order retained, so replay is total and
/// duplicate-free.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a topic; returns false when it was already present
    pub fn insert(&mut self, subscription: Subscription) -> bool {
        if self.entries.contains(&subscription) {
            return false;
        }
        self.entries.push(subscription);
        true
    }

    /// Forget a topic; returns false when it was not present
    pub fn remove(&mut self, subscription: &Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry != subscription);
        self.entries.len() != before
    }

    /// Record several topics and return the ones that were new
    pub fn insert_all(&mut self, subscriptions: &[Subscription]) -> Vec<Subscription> {
        subscriptions
            .iter()
            .filter(|sub| self.insert((*sub).clone()))
            .cloned()
            .collect()
    }

    /// Forget several topics and return the ones that were present
    pub fn remove_all(&mut self, subscriptions: &[Subscription]) -> Vec<Subscription> {
        subscriptions
            .iter()
            .filter(|sub| self.remove(sub))
            .cloned()
            .collect()
    }

    pub fn contains(&self, subscription: &Subscription) -> bool {
        self.entries.contains(subscription)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    /// Everything to re-send after a reconnect
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
