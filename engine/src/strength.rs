//! Rating → engine skill tier lookup.

/// Skill level paired with the minimum rating it is calibrated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrengthTier {
    pub skill_level: u8,
    pub min_rating: u32,
}

/// Ordered (skill, minimum rating) table, ascending by rating.
#[derive(Debug, Clone)]
pub struct StrengthTable {
    tiers: Vec<StrengthTier>,
}

/// Stockfish "Skill Level" calibration.
const STANDARD_TIERS: [(u8, u32); 20] = [
    (0, 1347),
    (1, 1490),
    (2, 1597),
    (3, 1694),
    (4, 1785),
    (5, 1871),
    (6, 1954),
    (7, 2035),
    (8, 2113),
    (9, 2189),
    (10, 2264),
    (11, 2337),
    (12, 2409),
    (13, 2480),
    (14, 2550),
    (15, 2619),
    (16, 2686),
    (17, 2754),
    (18, 2820),
    (19, 2886),
];

/// Skill level used for analysis, independent of the session's play strength.
pub const MAX_SKILL_LEVEL: u8 = 20;

impl StrengthTable {
    /// Build a table from (skill, min rating) pairs. Returns `None` when
    /// empty or not sorted ascending by rating.
    pub fn new(pairs: &[(u8, u32)]) -> Option<Self> {
        if pairs.is_empty() || pairs.windows(2).any(|w| w[0].1 > w[1].1) {
            return None;
        }
        let tiers = pairs
            .iter()
            .map(|&(skill_level, min_rating)| StrengthTier {
                skill_level,
                min_rating,
            })
            .collect();
        Some(Self { tiers })
    }

    pub fn standard() -> Self {
        let tiers = STANDARD_TIERS
            .iter()
            .map(|&(skill_level, min_rating)| StrengthTier {
                skill_level,
                min_rating,
            })
            .collect();
        Self { tiers }
    }

    /// Leftmost tier whose minimum rating is >= `rating`, saturating at
    /// the strongest tier.
    pub fn tier_for(&self, rating: u32) -> u8 {
        let idx = self.tiers.partition_point(|t| t.min_rating < rating);
        self.tiers
            .get(idx)
            .or_else(|| self.tiers.last())
            .map(|t| t.skill_level)
            .unwrap_or(0)
    }

    pub fn tiers(&self) -> &[StrengthTier] {
        &self.tiers
    }
}

impl Default for StrengthTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_lookups() {
        let table = StrengthTable::standard();
        assert_eq!(table.tier_for(2000), 7);
        assert_eq!(table.tier_for(1347), 0);
        assert_eq!(table.tier_for(3000), 19);
    }

    #[test]
    fn test_below_first_and_exact_boundaries() {
        let table = StrengthTable::standard();
        assert_eq!(table.tier_for(0), 0);
        assert_eq!(table.tier_for(1348), 1);
        assert_eq!(table.tier_for(2035), 7);
        assert_eq!(table.tier_for(2036), 8);
        assert_eq!(table.tier_for(2886), 19);
    }

    #[test]
    fn test_custom_table() {
        let table = StrengthTable::new(&[(3, 100), (9, 200)]).unwrap();
        assert_eq!(table.tier_for(150), 9);
        assert_eq!(table.tier_for(50), 3);
        assert_eq!(table.tier_for(900), 9);
        assert_eq!(table.tiers().len(), 2);
    }

    #[test]
    fn test_rejects_unsorted_or_empty() {
        assert!(StrengthTable::new(&[]).is_none());
        assert!(StrengthTable::new(&[(0, 200), (1, 100)]).is_none());
    }
}
