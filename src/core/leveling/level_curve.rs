// Level curve math.
//
// Two hand-tuned power curves approximate the Mee6 level table: one up to
// level 47, a flatter one above it. They are fitted independently, so
// `level_to_xp(xp_to_level(x))` is only roughly `x`.

/// Highest XP value still evaluated on the lower curve.
pub const LOWER_CURVE_MAX_XP: f64 = 226_305.0;

/// Highest level still evaluated on the lower inverse curve.
pub const LOWER_CURVE_MAX_LEVEL: f64 = 47.0;

/// Fractional level for an XP total.
pub fn xp_to_level(xp: f64) -> f64 {
    if xp <= LOWER_CURVE_MAX_XP {
        0.2869 * xp.powf(0.415)
    } else {
        0.2869 * xp.powf(0.402) + 7.0
    }
}

/// Total XP that corresponds to a level. Only used for display.
pub fn level_to_xp(level: f64) -> f64 {
    if level <= LOWER_CURVE_MAX_LEVEL {
        20.2616 * level.powf(2.40964)
    } else {
        22.3321 * (level - 7.0).powf(2.48756)
    }
}

/// The whole level shown to users.
pub fn level_of(xp: u64) -> u32 {
    xp_to_level(xp as f64).floor() as u32
}

/// XP total at which `level` starts, rounded up to a whole point.
pub fn xp_for_level(level: u32) -> u64 {
    level_to_xp(level as f64).ceil() as u64
}
