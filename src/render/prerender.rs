//! Read-ahead policy

use super::request::{Intent, RenderRequest};

/// Picks at most one neighbouring page to render speculatively after a
/// completed render.
#[derive(Clone, Copy, Debug)]
pub struct PrerenderPlanner {
    enabled: bool,
    read_behind: bool,
}

impl PrerenderPlanner {
    #[must_use]
    pub const fn new(enabled: bool, read_behind: bool) -> Self {
        Self {
            enabled,
            read_behind,
        }
    }

    /// Candidate to submit after `completed` finished (rendered or cache hit).
    ///
    /// A foreground page `p` looks ahead to `p + 1`, or back to `p - 1` on the
    /// last page. Once the look-ahead of `p + 1` itself completes, `p - 1` is
    /// read behind. Nothing follows any other prerender.
    #[must_use]
    pub fn plan(&self, completed: &RenderRequest, page_count: usize) -> Option<RenderRequest> {
        if !self.enabled || completed.is_live() {
            return None;
        }

        let p = completed.page;
        let candidate = match completed.intent {
            Intent::Foreground => {
                if p < page_count {
                    Some((p + 1, p))
                } else if p > 1 {
                    Some((p - 1, p))
                } else {
                    None
                }
            }
            Intent::Prerender => {
                let trigger = completed.trigger?;
                if self.read_behind && trigger.checked_add(1) == Some(p) && trigger > 1 {
                    Some((trigger - 1, trigger))
                } else {
                    None
                }
            }
        };

        candidate.map(|(page, trigger)| {
            RenderRequest::prerender(page, completed.zoom_ratio, completed.rotation, trigger)
        })
    }
}

impl Default for PrerenderPlanner {
    fn default() -> Self {
        Self::new(true, true)
    }
}
