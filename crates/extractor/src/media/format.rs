use std::cmp::Reverse;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Container preferred when several renditions fit equally well
pub const PREFERRED_EXTENSION: &str = "mp4";

// Added to the distance of any rendition taller than the target, so an
// undershoot always beats an overshoot of the same size
const OVERSHOOT_PENALTY: i64 = 5000;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    #[serde(default)]
    pub format_id: Option<String>,
    pub extension: String,
    pub height: Option<u32>,
    pub has_video: bool,
    pub has_audio: bool,
    pub url: Option<String>,
}

impl FormatDescriptor {
    /// Carries both an audio and a video track
    pub fn is_combined(&self) -> bool {
        self.has_audio && self.has_video
    }

    pub fn is_mp4(&self) -> bool {
        self.extension.eq_ignore_ascii_case(PREFERRED_EXTENSION)
    }

    fn score(&self, max_height: u32) -> (u8, i64, Reverse<u32>) {
        let height = self.height.unwrap_or(0);
        let ext_rank = if self.is_mp4() { 0 } else { 1 };

        let mut distance = (i64::from(height) - i64::from(max_height)).abs();
        if height > max_height {
            distance += OVERSHOOT_PENALTY;
        }

        (ext_rank, distance, Reverse(height))
    }
}

impl Display for FormatDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tracks = match (self.has_video, self.has_audio) {
            (true, true) => "av",
            (true, false) => "video only",
            (false, true) => "audio only",
            (false, false) => "no tracks",
        };
        match self.height {
            Some(h) => write!(f, "{} {}p ({tracks})", self.extension, h),
            None => write!(f, "{} ({tracks})", self.extension),
        }
    }
}

/// Pick the combined audio+video rendition closest to `max_height`.
///
/// Only renditions with both tracks are eligible, since nothing downstream
/// muxes. Candidates rank by container (mp4 first), then distance to the
/// target with a heavy penalty for overshooting, then greater height. Ties
/// keep the provider's order.
///
/// `None` means no combined rendition exists; callers fall back rather than
/// fail.
pub fn select_combined(formats: &[FormatDescriptor], max_height: u32) -> Option<&FormatDescriptor> {
    formats
        .iter()
        .filter(|f| f.is_combined())
        .min_by_key(|f| f.score(max_height))
}
