use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A set of channel names.
///
/// The required channel set of the shared connection is always derived from
/// the registry, never stored by callers. Two sets are compared by value to
/// decide whether the connection has to be reopened. Names are kept sorted so
/// the generated query string is stable across reconnects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSet(BTreeSet<String>);

impl ChannelSet {
    /// Create an empty channel set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.0.contains(channel)
    }

    pub fn insert(&mut self, channel: impl Into<String>) -> bool {
        self.0.insert(channel.into())
    }

    /// Add every channel of `channels` to this set.
    pub fn extend_from<'a>(&mut self, channels: impl IntoIterator<Item = &'a String>) {
        self.0.extend(channels.into_iter().cloned());
    }

    /// Returns `true` if any channel is present in both sets.
    pub fn intersects(&self, other: &ChannelSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.0.iter().any(|c| large.0.contains(c))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, channel) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", channel)?;
        }
        write!(f, "}}")
    }
}
