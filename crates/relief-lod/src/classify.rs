//! Leaf classification against aggregated feedback.

/// How a leaf's zoom compares to what the feedback asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Coarser than required; split candidate.
    TooLow,
    /// Finer than required; merge candidate.
    TooHigh,
    JustRight,
    /// No feedback pixel covered the tile.
    Unsampled,
}

impl Classification {
    /// Compare a tile at `zoom` with the `required` zoom from feedback.
    pub fn of(zoom: u8, required: Option<u8>) -> Self {
        match required {
            None => Classification::Unsampled,
            Some(r) if zoom < r => Classification::TooLow,
            Some(r) if zoom > r => Classification::TooHigh,
            Some(_) => Classification::JustRight,
        }
    }

    /// Whether a tile in this state may be folded into its parent.
    pub fn allows_merge(self) -> bool {
        matches!(self, Classification::TooHigh | Classification::Unsampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(Classification::of(9, Some(11)), Classification::TooLow);
        assert_eq!(Classification::of(9, Some(10)), Classification::TooLow);
        assert_eq!(Classification::of(9, Some(9)), Classification::JustRight);
        assert_eq!(Classification::of(9, Some(8)), Classification::TooHigh);
        assert_eq!(Classification::of(9, None), Classification::Unsampled);
    }

    #[test]
    fn test_merge_eligibility() {
        assert!(Classification::TooHigh.allows_merge());
        assert!(Classification::Unsampled.allows_merge());
        assert!(!Classification::TooLow.allows_merge());
        assert!(!Classification::JustRight.allows_merge());
    }
}
