use std::collections::HashSet;

/// Identifier of one discoverable report (its URL)
pub type CollectedLink = String;

/// Deduplicated set of collected links that remembers insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    order: Vec<CollectedLink>,
    seen: HashSet<CollectedLink>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a link, returning false if it was already present
    pub fn insert(&mut self, link: CollectedLink) -> bool {
        if self.seen.contains(&link) {
            return false;
        }
        self.seen.insert(link.clone());
        self.order.push(link);
        true
    }

    /// Union `links` into the set, returning how many were new
    pub fn merge<I>(&mut self, links: I) -> usize
    where
        I: IntoIterator<Item = CollectedLink>,
    {
        links
            .into_iter()
            .map(|link| self.insert(link))
            .filter(|&new| new)
            .count()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.seen.contains(link)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Links in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &CollectedLink> {
        self.order.iter()
    }

    /// Links sorted lexicographically, the order used for every file written
    pub fn sorted(&self) -> Vec<CollectedLink> {
        let mut links = self.order.clone();
        links.sort();
        links
    }
}

impl FromIterator<CollectedLink> for LinkSet {
    fn from_iter<T: IntoIterator<Item = CollectedLink>>(iter: T) -> Self {
        let mut set = LinkSet::new();
        set.merge(iter);
        set
    }
}
