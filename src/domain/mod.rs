//! Domain layer types for the mailsift engine.
//!
//! This module contains the core domain types used throughout the engine:
//! accounts and credentials, raw provider messages, parsed emails, and the
//! classification vocabulary.

mod account;
mod classification;
mod email;
mod message;
mod types;

pub use account::{Account, Credentials, ProviderType, SyncConfig, SyncWatermark};
pub use classification::{Category, Classification, ClassificationSource, Priority, Sentiment};
pub use email::{Address, Attachment, Email};
pub use message::{Header, MessagePart, MessageRef, PartBody, RawMessage};
pub use types::{AccountId, EmailId, ExternalId, ThreadId, UserId};
