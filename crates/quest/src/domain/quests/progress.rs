use quest_core::Quest;

/// Floor shown before the participant gets close, and before any sample arrives
pub const MIN_PROGRESS: f64 = 20.0;
/// At the location but the required photo hasn't been taken
pub const AWAITING_PHOTO_PROGRESS: f64 = 75.0;
pub const FULL_PROGRESS: f64 = 100.0;

/// Progress outside the geofence: `max(20, 100 - distance / radius * 80)`.
/// Anything at or beyond the radius sits at the floor.
pub fn out_of_range_progress(distance_meters: f64, radius_meters: f64) -> f64 {
    if !distance_meters.is_finite() || !radius_meters.is_finite() || radius_meters <= 0.0 {
        return MIN_PROGRESS;
    }
    let scaled = FULL_PROGRESS - (distance_meters / radius_meters) * 80.0;
    scaled.max(MIN_PROGRESS)
}

/// Completion percentage shown for a quest that has not been completed yet.
pub fn progress_percentage(
    quest: &Quest,
    distance_meters: Option<f64>,
    in_range: bool,
    photo_captured: bool,
) -> f64 {
    let ceiling = if quest.required_photo && !photo_captured {
        AWAITING_PHOTO_PROGRESS
    } else {
        FULL_PROGRESS
    };

    if !quest.has_location_requirement() || in_range {
        return ceiling;
    }

    match distance_meters {
        Some(distance) => out_of_range_progress(distance, quest.location_radius_meters).min(ceiling),
        None => MIN_PROGRESS,
    }
}

/// Location and photo criteria both hold. State gating (nothing in flight,
/// not already completed) is up to the caller.
pub fn can_complete(quest: &Quest, in_range: bool, photo_verified: bool) -> bool {
    let location_ok = !quest.has_location_requirement() || in_range;
    let photo_ok = !quest.required_photo || photo_verified;
    quest.is_active && location_ok && photo_ok
}
