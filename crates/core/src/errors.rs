use thiserror::Error;

use crate::registry::BackendId;

/// Terminal failures surfaced to the chat-transport collaborator.
///
/// Parse failures on a structured payload are recovered locally by the
/// streaming reducer (heuristic fallback extraction) and never reach this
/// enum; `ParseFailure` here covers only the case where the stream ended
/// with nothing at all to fall back onto.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown backend `{}`", .0.as_str())]
    UnknownBackend(BackendId),
    #[error("no backend satisfies the query requirements: {0}")]
    CapabilityMismatch(String),
    #[error("backend dispatch failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },
    #[error("backend produced no usable response: {0}")]
    ParseFailure(String),
    #[error("turn was cancelled before completion")]
    Cancelled,
}

impl DispatchError {
    /// Human-readable instruction for the collaborator to render. Never a
    /// synthetic success: on terminal failure the customer is pointed at
    /// direct contact.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnknownBackend(_) | Self::CapabilityMismatch(_) | Self::ParseFailure(_) => {
                "We could not process your request automatically. \
                 Please call us directly and we will help you right away."
            }
            Self::ExhaustedRetries { .. } => {
                "Our assistant is temporarily unreachable. \
                 Please call us directly for immediate help."
            }
            Self::Cancelled => {
                "The conversation was interrupted. \
                 Please send your message again or call us directly."
            }
        }
    }
}
