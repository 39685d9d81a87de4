//! Resource paths: `/collection/{id|_all}/subcollection/{id|_all}/...`.

use crate::error::AppError;
use std::fmt;

/// Parent segment meaning "any parent".
pub const WILDCARD_PATH_SEGMENT: &str = "_all";

/// Parent identifier position from the end for collection-scoped paths (`/thread/42/message`).
pub const DIR_PARENT_OFFSET: usize = 1;

/// Parent identifier position from the end for item-scoped paths (`/thread/42/message/7`).
pub const ITEM_PARENT_OFFSET: usize = 2;

/// Parent identifier extracted from a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentId {
    /// The wildcard segment.
    Any,
    Id(i64),
}

impl ParentId {
    pub fn id(self) -> Option<i64> {
        match self {
            ParentId::Any => None,
            ParentId::Id(id) => Some(id),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// Split on `/`, dropping empty segments, so leading and trailing slashes are ignored.
    pub fn parse(path: &str) -> Self {
        ResourcePath {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResourcePath {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment `n` positions before the last one; `nth_from_end(0)` is the last segment.
    pub fn nth_from_end(&self, n: usize) -> Option<&str> {
        let len = self.segments.len();
        if n >= len {
            return None;
        }
        Some(self.segments[len - 1 - n].as_str())
    }

    pub fn last(&self) -> Option<&str> {
        self.nth_from_end(0)
    }

    /// Item identifier in the last segment.
    pub fn last_id(&self) -> Result<i64, AppError> {
        let seg = self
            .last()
            .ok_or_else(|| AppError::BadRequest("empty path has no item identifier".into()))?;
        parse_id(seg)
    }

    /// Parent identifier at `offset` from the end: the wildcard or a numeric id.
    pub fn parent_id(&self, offset: usize) -> Result<ParentId, AppError> {
        match self.nth_from_end(offset) {
            Some(WILDCARD_PATH_SEGMENT) => Ok(ParentId::Any),
            Some(seg) => parse_id(seg).map(ParentId::Id),
            None => Err(AppError::BadRequest(format!("path {} has no parent segment", self))),
        }
    }

    /// Numeric parent identifier; the wildcard is refused.
    pub fn concrete_parent_id(&self, offset: usize) -> Result<i64, AppError> {
        match self.parent_id(offset)? {
            ParentId::Id(id) => Ok(id),
            ParentId::Any => Err(AppError::BadRequest(format!(
                "{} is only allowed in queries: {}",
                WILDCARD_PATH_SEGMENT, self
            ))),
        }
    }

    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        ResourcePath { segments }
    }

    pub fn with_id(&self, id: i64) -> Self {
        self.append(id.to_string())
    }
}

fn parse_id(seg: &str) -> Result<i64, AppError> {
    seg.parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("identifier segment is not numeric: {}", seg)))
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for s in &self.segments {
            write!(f, "/{}", s)?;
        }
        Ok(())
    }
}

impl From<&str> for ResourcePath {
    fn from(s: &str) -> Self {
        ResourcePath::parse(s)
    }
}
