//! Per-visitor session state.
//!
//! Each session owns its current page and its review board. Nothing here is
//! persisted; sessions vanish with the process.

use chrono::{DateTime, Utc};
use farm_common::ReviewBoard;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Dashboard pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Main,
    Explore,
    Feedback,
    Visualization,
    Chatbot,
}

/// One visitor's state
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub page: Page,
    pub reviews: ReviewBoard,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            page: Page::Main,
            reviews: ReviewBoard::new(),
            created_at: Utc::now(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub page: Page,
    pub review_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            page: session.page,
            review_count: session.reviews.len(),
            created_at: session.created_at,
        }
    }
}

/// In-memory session table
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<Uuid, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session on the main page
    pub fn create(&mut self) -> &Session {
        let session = Session::new();
        let id = session.id;
        self.sessions.entry(id).or_insert(session)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// End a session, dropping its page and reviews
    pub fn remove(&mut self, id: &Uuid) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
