//! Opaque keyset pagination cursor.
//!
//! A cursor pins the last-seen `(created_at, id)` pair of a listing page.
//! The next page contains rows with `created_at` strictly earlier, or equal
//! `created_at` with a greater `id`, which reproduces the
//! `created_at DESC, id ASC` total order without OFFSET and stays stable
//! under concurrent inserts ahead of the cursor position.

use chrono::{DateTime, Utc};
use common::OrderId;
use thiserror::Error;
use uuid::Uuid;

/// A decoded pagination cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: OrderId,
}

/// The supplied cursor token could not be decoded.
#[derive(Debug, Error)]
#[error("Invalid cursor")]
pub struct CursorError;

impl PageCursor {
    /// Creates a cursor from a boundary row.
    pub fn new(created_at: DateTime<Utc>, id: OrderId) -> Self {
        Self { created_at, id }
    }

    /// Encodes the cursor as an opaque token.
    pub fn encode(&self) -> String {
        format!("{}|{}", self.created_at.to_rfc3339(), self.id)
    }
}

impl std::str::FromStr for PageCursor {
    type Err = CursorError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (ts, id) = token.split_once('|').ok_or(CursorError)?;
        let created_at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| CursorError)?
            .with_timezone(&Utc);
        let id = Uuid::parse_str(id).map_err(|_| CursorError)?;
        Ok(Self {
            created_at,
            id: OrderId::from_uuid(id),
        })
    }
}

impl std::fmt::Display for PageCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}
