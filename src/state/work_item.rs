use serde::{Deserialize, Serialize};

/// A page waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Normalized URL
    pub url: String,
    /// Link-following hops from the seed
    pub depth: u32,
    /// Page the link was found on; `None` for seeds
    #[serde(default)]
    pub origin: Option<String>,
}

impl WorkItem {
    pub fn seed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            origin: None,
        }
    }

    /// A link found on `parent`, one hop deeper
    pub fn child_of(parent: &WorkItem, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: parent.depth + 1,
            origin: Some(parent.url.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_is_one_hop_deeper() {
        let seed = WorkItem::seed("https://e.com/");
        let child = WorkItem::child_of(&seed, "https://e.com/a");
        assert_eq!(child.depth, 1);
        assert_eq!(child.origin.as_deref(), Some("https://e.com/"));
    }
}
