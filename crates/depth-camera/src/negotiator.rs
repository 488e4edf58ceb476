//! Output-mode negotiation against the modes a stream actually supports.
//!
//! Negotiation is exact-match-or-default: a requested mode is used only if
//! the hardware lists it verbatim, otherwise the stream's default mode is
//! applied and the caller is told so. No "closest mode" search is done.

use crate::mode::CaptureMode;

/// Ordered set of capture modes a stream can produce
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedModeSet {
    modes: Vec<CaptureMode>,
}

impl SupportedModeSet {
    pub fn new(modes: Vec<CaptureMode>) -> Self {
        Self { modes }
    }

    pub fn contains(&self, mode: &CaptureMode) -> bool {
        self.modes.contains(mode)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureMode> {
        self.modes.iter()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

impl From<Vec<CaptureMode>> for SupportedModeSet {
    fn from(modes: Vec<CaptureMode>) -> Self {
        Self::new(modes)
    }
}

impl FromIterator<CaptureMode> for SupportedModeSet {
    fn from_iter<I: IntoIterator<Item = CaptureMode>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Outcome of a negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Mode to apply to the device
    pub mode: CaptureMode,
    /// True when the request was not supported and the default was chosen
    pub used_default: bool,
}

/// Resolve `requested` against `supported`, falling back to `default`.
pub fn negotiate(
    requested: &CaptureMode,
    supported: &SupportedModeSet,
    default: &CaptureMode,
) -> Negotiated {
    if supported.contains(requested) {
        Negotiated {
            mode: *requested,
            used_default: false,
        }
    } else {
        Negotiated {
            mode: *default,
            used_default: true,
        }
    }
}
