//! Farmer reviews of pesticides.
//!
//! Reviews live only in the session that collected them. Newest first.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const DEFAULT_RATING: u8 = 3;

/// Crops a review can be filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crop {
    Wheat,
    Rice,
    Cotton,
    Maize,
    Vegetables,
}

impl Crop {
    pub const ALL: [Crop; 5] = [
        Crop::Wheat,
        Crop::Rice,
        Crop::Cotton,
        Crop::Maize,
        Crop::Vegetables,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Crop::Wheat => "Wheat",
            Crop::Rice => "Rice",
            Crop::Cotton => "Cotton",
            Crop::Maize => "Maize",
            Crop::Vegetables => "Vegetables",
        }
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review submission problems. Nothing is stored when these occur.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("Please fill all required fields: {0} is empty")]
    MissingField(&'static str),

    #[error("Rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),
}

fn default_rating() -> u8 {
    DEFAULT_RATING
}

/// Unvalidated form input. Omitted text fields arrive blank and are
/// rejected by validation like any other blank field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDraft {
    #[serde(default)]
    pub pesticide: String,
    pub crop: Crop,
    #[serde(default = "default_rating")]
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

/// Accepted review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub pesticide: String,
    pub crop: Crop,
    pub rating: u8,
    pub comment: String,
}

impl Review {
    /// Filled stars for the rating, hollow stars up to five
    pub fn stars(&self) -> String {
        let filled = usize::from(self.rating.min(MAX_RATING));
        let hollow = usize::from(MAX_RATING) - filled;
        format!("{}{}", "★".repeat(filled), "☆".repeat(hollow))
    }
}

impl TryFrom<ReviewDraft> for Review {
    type Error = ReviewError;

    fn try_from(draft: ReviewDraft) -> Result<Self, Self::Error> {
        if draft.pesticide.trim().is_empty() {
            return Err(ReviewError::MissingField("pesticide"));
        }
        if draft.comment.trim().is_empty() {
            return Err(ReviewError::MissingField("comment"));
        }
        if !(MIN_RATING..=MAX_RATING).contains(&draft.rating) {
            return Err(ReviewError::RatingOutOfRange(draft.rating));
        }

        Ok(Self {
            pesticide: draft.pesticide,
            crop: draft.crop,
            rating: draft.rating,
            comment: draft.comment,
        })
    }
}

/// Ordered review list, most recent first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewBoard {
    reviews: Vec<Review>,
}

impl ReviewBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert at the front
    pub fn submit(&mut self, draft: ReviewDraft) -> Result<&Review, ReviewError> {
        let review = Review::try_from(draft)?;
        self.reviews.insert(0, review);
        Ok(&self.reviews[0])
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn len(&self) -> usize {
        self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}
