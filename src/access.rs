//! Access predicates that gate traversal of a tile, e.g. a locked door.
use smallvec::SmallVec;

/// The access tags an agent carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessCredentials(SmallVec<[String; 4]>);

impl AccessCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag, returning the credentials for chaining.
    pub fn with(mut self, tag: impl Into<String>) -> Self {
        self.insert(tag);
        self
    }

    pub fn insert(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.contains(&tag) {
            self.0.push(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AccessCredentials {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut credentials = AccessCredentials::new();
        for tag in iter {
            credentials.insert(tag);
        }
        credentials
    }
}

/// Decides whether an agent holding some credentials may pass.
///
/// Readers are registered on nodes by door-like entities and are consulted by every traversal
/// check, so they need to be cheap and shareable across threads.
pub trait AccessReader: Send + Sync {
    fn is_allowed(&self, credentials: &AccessCredentials) -> bool;
}

impl<F> AccessReader for F
where
    F: Fn(&AccessCredentials) -> bool + Send + Sync,
{
    fn is_allowed(&self, credentials: &AccessCredentials) -> bool {
        self(credentials)
    }
}

/// Allows anyone holding at least one of the listed tags. An empty list allows everyone.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    tags: SmallVec<[String; 2]>,
}

impl AccessList {
    pub fn new<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Self {
        AccessList {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

impl AccessReader for AccessList {
    fn is_allowed(&self, credentials: &AccessCredentials) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|tag| credentials.contains(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_list() {
        let list = AccessList::new(["engineering", "captain"]);

        assert!(list.is_allowed(&AccessCredentials::new().with("captain")));
        assert!(!list.is_allowed(&AccessCredentials::new().with("medical")));
        assert!(!list.is_allowed(&AccessCredentials::new()));
        assert!(AccessList::default().is_allowed(&AccessCredentials::new()));
    }

    #[test]
    fn test_closure_reader() {
        let reader = |credentials: &AccessCredentials| !credentials.is_empty();
        assert!(reader.is_allowed(&AccessCredentials::from_iter(["a"])));
        assert!(!reader.is_allowed(&AccessCredentials::new()));
    }

    #[test]
    fn test_credentials_dedup() {
        let credentials: AccessCredentials = ["a", "b", "a"].into_iter().collect();
        assert_eq!(credentials.iter().count(), 2);
    }
}
