//! Count records and their ranking order.

use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;

/// One `(item, count)` pair produced by combining identical items.
///
/// `Ord` is the ranking order used everywhere a top-N decision is made:
/// a record is **greater** when its count is higher, and on equal counts
/// when its item sorts lexicographically *earlier*. The order is total, so
/// rankings never depend on arrival order or thread scheduling.
///
/// ```
/// use topn::UrlCount;
///
/// let a = UrlCount::new("a.com", 3);
/// let b = UrlCount::new("b.com", 3);
/// let c = UrlCount::new("c.com", 7);
///
/// assert!(c > a);
/// assert!(a > b); // same count, "a.com" ranks first
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct UrlCount {
    pub url: String,
    pub count: u64,
}

impl UrlCount {
    #[must_use]
    pub fn new(url: impl Into<String>, count: u64) -> Self {
        Self {
            url: url.into(),
            count,
        }
    }
}

impl Ord for UrlCount {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.url.cmp(&self.url))
    }
}

impl PartialOrd for UrlCount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result-file rendering: `<item>: <count>`.
impl fmt::Display for UrlCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.count)
    }
}

impl From<(String, u64)> for UrlCount {
    fn from((url, count): (String, u64)) -> Self {
        Self { url, count }
    }
}
