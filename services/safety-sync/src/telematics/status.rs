/// Review status of a safety event as reported by the telematics provider.
///
/// The provider sends a numeric `statusId`; anything outside the known
/// enumeration (or no code at all) is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    New,
    InReview,
    CoachingRequired,
    CoachingScheduled,
    Coached,
    Dismissed,
    Resolved,
    Unknown,
}

impl EventStatus {
    /// Every status with a provider code, in code order.
    #[cfg(test)]
    pub const KNOWN: [EventStatus; 7] = [
        Self::New,
        Self::InReview,
        Self::CoachingRequired,
        Self::CoachingScheduled,
        Self::Coached,
        Self::Dismissed,
        Self::Resolved,
    ];

    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Self::New,
            Some(2) => Self::InReview,
            Some(3) => Self::CoachingRequired,
            Some(4) => Self::CoachingScheduled,
            Some(5) => Self::Coached,
            Some(6) => Self::Dismissed,
            Some(7) => Self::Resolved,
            _ => Self::Unknown,
        }
    }

    #[cfg(test)]
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::New => Some(1),
            Self::InReview => Some(2),
            Self::CoachingRequired => Some(3),
            Self::CoachingScheduled => Some(4),
            Self::Coached => Some(5),
            Self::Dismissed => Some(6),
            Self::Resolved => Some(7),
            Self::Unknown => None,
        }
    }

    /// Label stored in `safety_events.status_label`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InReview => "In Review",
            Self::CoachingRequired => "Coaching Required",
            Self::CoachingScheduled => "Coaching Scheduled",
            Self::Coached => "Coached",
            Self::Dismissed => "Dismissed",
            Self::Resolved => "Resolved",
            Self::Unknown => "Unknown",
        }
    }
}
