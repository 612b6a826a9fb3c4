//! Error taxonomy for the workflow engine.
//!
//! Three families, all recoverable by retrying the same action: precondition
//! failures (no backend call is made), backend failures (state and credits
//! untouched), and local image-processing failures (treated like backend
//! failures by the caller).

use crate::backend::BackendError;
use crate::credits::InsufficientCredits;
use crate::image_ops::ImageOpError;
use crate::payments::PaymentError;
use crate::settings::InvalidSettings;

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    // Preconditions. Nothing has been attempted yet.
    #[error("please log in first")]
    NotAuthenticated,
    #[error("please upload a product image first")]
    NoSourceImage,
    #[error(transparent)]
    InsufficientCredits(#[from] InsufficientCredits),
    #[error("no generated image with id {0}")]
    UnknownImage(String),
    #[error("describe the change you want before regenerating")]
    EmptyPrompt,
    #[error("the uploaded file is not a supported image")]
    UnsupportedUpload,
    #[error(transparent)]
    InvalidSettings(#[from] InvalidSettings),
    #[error("another operation is already running")]
    Busy,

    // Mid-flight outcomes.
    #[error("the target image was replaced before the result arrived")]
    Superseded,
    #[error("the backend returned no usable images")]
    NothingRendered,

    // Collaborator failures, surfaced verbatim.
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Image(#[from] ImageOpError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}
