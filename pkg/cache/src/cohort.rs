use std::collections::BTreeSet;

/// A named group of cluster-queues that may lend unused quota to each
/// other. Holds member names only; the entries stay owned by the cache map,
/// which keeps the queue↔cohort relationship acyclic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cohort {
    pub name: String,
    members: BTreeSet<String>,
}

impl Cohort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, member: &str) {
        self.members.insert(member.to_string());
    }

    pub fn remove(&mut self, member: &str) {
        self.members.remove(member);
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    /// A cohort with no members is destroyed by the cache.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &BTreeSet<String> {
        &self.members
    }
}
