//! Audio focus
//!
//! Platform arbitration over who may produce sound. Focus changes
//! arrive asynchronously on the engine channel; the engine pauses on
//! loss and resumes only when playback was interrupted by that loss
//! rather than by the user.

/// Focus transitions delivered to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    /// Focus (re)granted; playback may resume.
    Gain,
    /// Focus lost for an indefinite period.
    Loss,
    /// Focus lost briefly (another sound source is temporarily active).
    TransientLoss,
}

/// Platform audio focus arbiter.
pub trait AudioFocus: Send + Sync {
    /// Request focus before starting playback. Returns whether focus
    /// was granted. Playback proceeds either way; a later `Loss` event
    /// pauses it.
    fn request(&mut self) -> bool;

    /// Give focus back once playback is fully torn down.
    fn abandon(&mut self);
}

/// Arbiter for hosts without a focus system. Always grants.
pub struct NoopFocus;

impl AudioFocus for NoopFocus {
    fn request(&mut self) -> bool {
        true
    }

    fn abandon(&mut self) {}
}
