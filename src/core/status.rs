use serde::{Deserialize, Serialize};

/// Outcome discriminator carried by every core response.
///
/// `Degraded` means an answer was produced but something it depends on
/// (retrieval, generation, parsing) was unavailable, and the payload says
/// which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreStatus {
    Success,
    Degraded,
    Error,
}

impl CoreStatus {
    /// The worse of two outcomes.
    pub fn combine(self, other: CoreStatus) -> CoreStatus {
        use CoreStatus::*;
        match (self, other) {
            (Error, _) | (_, Error) => Error,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_keeps_the_worst() {
        assert_eq!(CoreStatus::Success.combine(CoreStatus::Success), CoreStatus::Success);
        assert_eq!(CoreStatus::Success.combine(CoreStatus::Degraded), CoreStatus::Degraded);
        assert_eq!(CoreStatus::Degraded.combine(CoreStatus::Error), CoreStatus::Error);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CoreStatus::Degraded).unwrap(), "\"degraded\"");
    }
}
