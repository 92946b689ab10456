//! Advice Generator
//!
//! Turns a usage prediction or a farmer's question into a prompt and hands it
//! to the language model. The reply is passed through untouched: the requested
//! bullet style and field layout are instructions to the model, not checks.

use crate::llm_client::{LlmClient, LlmError};

/// Labelled fields the chatbot is asked to fill, one per line
pub const ANSWER_FIELDS: [&str; 7] = [
    "Crop",
    "Problem (Pest/Disease)",
    "Recommended Pesticide",
    "Dosage",
    "Waiting Period",
    "Safety Notes",
    "Alternative Options",
];

/// Prompt for explaining a usage prediction to a farmer
pub fn prediction_prompt(value: f64, region: &str, year: i32) -> String {
    format!(
        "You are an agriculture farm management assistant.

ML Prediction:
- Area code: {region}
- Year: {year}
- Predicted pesticide usage: {value}

Give clear, simple, farmer-friendly advice.
Use bullet points.
Avoid technical words.
"
    )
}

/// Prompt for a free-form question with the fixed answer layout
pub fn question_prompt(question: &str) -> String {
    let fields: String = ANSWER_FIELDS
        .iter()
        .map(|field| format!("{field}:\n"))
        .collect();

    format!(
        "You are an AI Farm Assistant.

IMPORTANT RULES:
- Use very simple words
- Use short bullet points
- EACH FIELD MUST BE ON A NEW LINE
- DO NOT write in paragraph form

STRICT OUTPUT FORMAT (EXACT):

{fields}
Farmer Question:
{question}
"
    )
}

/// Prompt builder bound to a language-model backend
pub struct Advisor<C: ?Sized> {
    client: Box<C>,
}

impl<C: LlmClient + ?Sized> Advisor<C> {
    pub fn new(client: Box<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Farmer-friendly advice for a predicted usage value
    pub fn explain_prediction(&self, value: f64, region: &str, year: i32) -> String {
        self.client.complete(&prediction_prompt(value, region, year))
    }

    /// Same as [`Self::explain_prediction`] but keeps the failure cause
    pub fn try_explain_prediction(
        &self,
        value: f64,
        region: &str,
        year: i32,
    ) -> Result<String, LlmError> {
        self.client
            .try_complete(&prediction_prompt(value, region, year))
    }

    /// Structured answer to a farmer's question
    pub fn answer_question(&self, question: &str) -> String {
        self.client.complete(&question_prompt(question))
    }

    pub fn try_answer_question(&self, question: &str) -> Result<String, LlmError> {
        self.client.try_complete(&question_prompt(question))
    }
}
