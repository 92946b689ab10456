//! Farm Common - prediction and advice pipeline for the farm advisor.
//!
//! Dataset -> usage predictor -> advice prompts -> chat-completion client.
//! Everything here is synchronous and owns no session state; the HTTP
//! layer in `farmd` holds sessions and calls in.

pub mod advice;
pub mod config;
pub mod dataset;
pub mod llm_client;
pub mod predictor;
pub mod reviews;

pub use advice::{prediction_prompt, question_prompt, Advisor, ANSWER_FIELDS};
pub use config::{ConfigError, FarmConfig, LlmConfig, ModelConfig};
pub use dataset::{Dataset, DatasetError, TrendPoint, UsageRecord};
pub use llm_client::{
    FakeLlmClient, HttpLlmClient, LlmClient, LlmError, FALLBACK_RESPONSE,
    FARM_ASSISTANT_SYSTEM_PROMPT,
};
pub use predictor::{Coefficients, Evaluation, ModelError, RegionEncoding, UsagePredictor};
pub use reviews::{Crop, Review, ReviewBoard, ReviewDraft, ReviewError};
