//! Level/XP calculator.
//!
//! Fixed-width curve: every level costs the same 500 XP.

/// XP required per level
pub const XP_PER_LEVEL: u64 = 500;

/// Level for a cumulative XP total. Level 1 starts at 0 XP.
pub fn level_for_xp(total_xp: u64) -> u64 {
    total_xp / XP_PER_LEVEL + 1
}

/// XP still needed to reach the next level
pub fn xp_to_next_level(total_xp: u64) -> u64 {
    XP_PER_LEVEL - total_xp % XP_PER_LEVEL
}

/// Fraction of the current level completed, in `[0, 1)`
pub fn level_progress(total_xp: u64) -> f64 {
    (total_xp % XP_PER_LEVEL) as f64 / XP_PER_LEVEL as f64
}
