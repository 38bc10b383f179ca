//! Commit search queries and paged results.

use arbor_types::{BranchPath, Timestamp};
use serde::{Deserialize, Serialize};

use crate::records::Commit;

/// Default page size when a query does not set one.
pub const DEFAULT_LIMIT: usize = 50;

/// Sort order of search results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    TimestampAsc,
    #[default]
    TimestampDesc,
}

/// Filters, sort and paging for [`CommitLog::search`](crate::CommitLog::search).
///
/// All filters are optional and combine with AND.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommitQuery {
    /// Exact branch path.
    pub branch: Option<BranchPath>,
    /// Branch path prefix, e.g. `MAIN/2024` for every branch below it.
    pub branch_prefix: Option<String>,
    /// Exact author.
    pub author: Option<String>,
    /// Case-insensitive substring of the comment.
    pub comment: Option<String>,
    /// Inclusive lower timestamp bound.
    pub from: Option<Timestamp>,
    /// Inclusive upper timestamp bound.
    pub to: Option<Timestamp>,
    /// Only commits touching this object id.
    pub affected_object: Option<String>,
    pub sort: SortOrder,
    pub offset: usize,
    pub limit: usize,
}

impl Default for CommitQuery {
    fn default() -> Self {
        Self {
            branch: None,
            branch_prefix: None,
            author: None,
            comment: None,
            from: None,
            to: None,
            affected_object: None,
            sort: SortOrder::default(),
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl CommitQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch(mut self, branch: BranchPath) -> Self {
        self.branch = Some(branch);
        self
    }

    pub fn branch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.branch_prefix = Some(prefix.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Restrict to the exact timestamp.
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.from = Some(timestamp);
        self.to = Some(timestamp);
        self
    }

    pub fn between(mut self, from: Timestamp, to: Timestamp) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn affecting(mut self, object_id: impl Into<String>) -> Self {
        self.affected_object = Some(object_id.into());
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Returns `true` if `commit` passes every filter.
    pub fn matches(&self, commit: &Commit) -> bool {
        if let Some(ref branch) = self.branch {
            if &commit.branch != branch {
                return false;
            }
        }
        if let Some(ref prefix) = self.branch_prefix {
            if !commit.branch.as_str().starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(ref author) = self.author {
            if &commit.author != author {
                return false;
            }
        }
        if let Some(ref comment) = self.comment {
            if !commit
                .comment
                .to_lowercase()
                .contains(&comment.to_lowercase())
            {
                return false;
            }
        }
        if let Some(from) = self.from {
            if commit.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if commit.timestamp > to {
                return false;
            }
        }
        if let Some(ref object_id) = self.affected_object {
            if !commit.affects(object_id) {
                return false;
            }
        }
        true
    }

    /// Sort the matching commits and cut out the requested page.
    pub fn paginate(&self, mut commits: Vec<Commit>) -> Page<Commit> {
        commits.sort_by(|a, b| {
            let order = a.timestamp.cmp(&b.timestamp).then_with(|| a.branch.cmp(&b.branch));
            match self.sort {
                SortOrder::TimestampAsc => order,
                SortOrder::TimestampDesc => order.reverse(),
            }
        });
        let total = commits.len();
        let items = commits
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect();
        Page {
            items,
            total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// One page of search results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matches across all pages.
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    /// Returns `true` if more results follow this page.
    pub fn has_more(&self) -> bool {
        self.offset.saturating_add(self.items.len()) < self.total
    }
}
