//! Build interval records for a single unit of work (one project build)

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

/// One finished unit of work
///
/// Created by the session when a unit moves from in-progress to finished
/// and never modified afterwards. `begin` and `end` are offsets from the
/// session start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInterval {
    /// Unique, path-like identifier of the unit (e.g. `src\app\app.vcxproj`)
    pub id: String,

    /// Short human readable name derived from `id`
    pub display_name: String,

    /// 1-based order in which the unit began; matches the `N>` prefix of
    /// the build output log
    pub order_number: u32,

    /// Start offset from session start
    #[serde(rename = "begin_ms", with = "crate::serde_duration")]
    pub begin: Duration,

    /// End offset from session start
    #[serde(rename = "end_ms", with = "crate::serde_duration")]
    pub end: Duration,

    /// Whether the unit built successfully
    pub success: bool,
}

impl BuildInterval {
    /// Create a new interval, deriving the display name from `id`
    ///
    /// `end` is clamped so that `end >= begin` always holds.
    pub fn new(
        id: impl Into<String>,
        order_number: u32,
        begin: Duration,
        end: Duration,
        success: bool,
    ) -> Self {
        let id = id.into();
        let display_name = display_name(&id);
        Self {
            id,
            display_name,
            order_number,
            begin,
            end: end.max(begin),
            success,
        }
    }

    /// How long the unit took to build
    pub fn elapsed(&self) -> Duration {
        self.end - self.begin
    }

    /// Order by elapsed time, shortest first
    pub fn cmp_elapsed(&self, other: &Self) -> Ordering {
        self.elapsed().cmp(&other.elapsed())
    }
}

/// Convert a path-like unit id into its final path component
///
/// Both `/` and `\` are accepted as separators since ids usually come
/// from Windows solution files.
pub fn display_name(id: &str) -> String {
    match id.rsplit(|c| c == '/' || c == '\\').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => id.to_string(),
    }
}

/// Format an elapsed time the way the build chart labels it
///
/// Below one second two decimals are shown (`0.05s`), below ten seconds
/// one decimal (`7.3s`), above that whole seconds with minute and hour
/// prefixes (`1m5s`, `2h0m3s`).
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let millis = elapsed.as_millis();

    let mut out = if seconds > 9 {
        format!("{}s", seconds % 60)
    } else if seconds > 0 {
        format!("{}.{}s", seconds % 60, (millis / 100) % 10)
    } else {
        format!("0.{:02}s", (millis / 10) % 100)
    };

    let minutes = seconds / 60;
    if minutes > 0 {
        out = format!("{}m{}", minutes % 60, out);
        let hours = minutes / 60;
        if hours > 0 {
            out = format!("{}h{}", hours, out);
        }
    }

    out
}
