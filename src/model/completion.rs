use super::route_stop::RouteStop;
use crate::utils::non_blank;

/// The ways a stop's completion can be decided, checked in [`COMPLETION_RULES`] order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompletionRule {
    /// Status is "done"
    StatusDone,
    /// Status is "skipped"
    StatusSkipped,
    /// No status and no notes, but the driver travelled to the stop.
    /// Drivers often forget to mark a stop, so it counts as done.
    UnloggedButTravelled,
}

pub const COMPLETION_RULES: [CompletionRule; 3] = [
    CompletionRule::StatusDone,
    CompletionRule::StatusSkipped,
    CompletionRule::UnloggedButTravelled,
];

impl CompletionRule {
    pub fn matches(&self, stop: &RouteStop) -> bool {
        match self {
            CompletionRule::StatusDone => stop.stop_status.as_deref() == Some("done"),
            CompletionRule::StatusSkipped => stop.stop_status.as_deref() == Some("skipped"),
            CompletionRule::UnloggedButTravelled => {
                non_blank(stop.stop_status.as_deref()).is_none()
                    && non_blank(stop.driver_notes.as_deref()).is_none()
                    && non_blank(stop.distance_km.as_deref()).is_some()
            }
        }
    }

    pub fn completion(&self) -> u8 {
        match self {
            CompletionRule::StatusDone | CompletionRule::UnloggedButTravelled => 1,
            CompletionRule::StatusSkipped => 0,
        }
    }
}

pub fn matching_rule(stop: &RouteStop) -> Option<CompletionRule> {
    COMPLETION_RULES.into_iter().find(|rule| rule.matches(stop))
}

/// 1 for completed, 0 for skipped, `None` when nothing can be inferred
pub fn infer_stop_completion(stop: &RouteStop) -> Option<u8> {
    matching_rule(stop).map(|rule| rule.completion())
}
