//! Listener priority tiers.

/// Execution tier for a listener registration.
///
/// Tiers run in ascending declaration order: `Lowest` first, `Monitor`
/// last. The convention follows the "last word wins" rule: a `Highest`
/// listener sees (and may override) every earlier listener's cancellation
/// decision, while `Monitor` exists purely to observe the final outcome
/// (logging, metrics) and must not alter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    Monitor,
}

impl EventPriority {
    /// All tiers in execution order.
    pub const ALL: [EventPriority; 6] = [
        Self::Lowest,
        Self::Low,
        Self::Normal,
        Self::High,
        Self::Highest,
        Self::Monitor,
    ];
}

impl std::fmt::Display for EventPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Lowest => "lowest",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Highest => "highest",
            Self::Monitor => "monitor",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_order_lowest_to_monitor() {
        assert!(EventPriority::Lowest < EventPriority::Low);
        assert!(EventPriority::Low < EventPriority::Normal);
        assert!(EventPriority::Normal < EventPriority::High);
        assert!(EventPriority::High < EventPriority::Highest);
        assert!(EventPriority::Highest < EventPriority::Monitor);
        assert!(EventPriority::ALL.windows(2).all(|w| w[0] < w[1]));
    }
}
