//! Classification model backends.
//!
//! The [`ClassificationModel`] trait asks one question of a remote model:
//! given an email's subject, sender, and body, return a strict JSON
//! verdict with category, priority, summary, and an optional event time.
//! The classifier treats any error from this layer as a signal to fall
//! back to its rule engine.
//!
//! # Example
//!
//! ```rust,no_run
//! use mailsift::providers::ai::{ClassificationModel, ModelRequest, OpenAiModel};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let model = OpenAiModel::openai("sk-...", "gpt-4o-mini");
//!
//! let request = ModelRequest::new(
//!     "Team offsite Thursday",
//!     "Dana <dana@corp.com>",
//!     "We meet at the north office at 10am.",
//! );
//!
//! let verdict = model.classify(&request).await?;
//! println!("{} / {}", verdict.category, verdict.priority);
//! # Ok(())
//! # }
//! ```

mod openai;
mod traits;

pub use openai::{OpenAiModel, DEFAULT_MODEL};
pub use traits::{
    ClassificationModel, ModelError, ModelRequest, ModelResult, ModelVerdict, MAX_BODY_CHARS,
    MAX_SUMMARY_CHARS,
};
