//! Validation utilities shared between the engine and its adapters

use crate::{Coordinate, CoreError, LocationSample, Quest};

/// Validate a latitude/longitude pair
pub fn validate_coordinate(coordinate: &Coordinate) -> Result<(), CoreError> {
    if !coordinate.latitude.is_finite() || !(-90.0..=90.0).contains(&coordinate.latitude) {
        return Err(CoreError::InvalidCoordinate(format!(
            "latitude {} outside [-90, 90]",
            coordinate.latitude
        )));
    }
    if !coordinate.longitude.is_finite() || !(-180.0..=180.0).contains(&coordinate.longitude) {
        return Err(CoreError::InvalidCoordinate(format!(
            "longitude {} outside [-180, 180]",
            coordinate.longitude
        )));
    }
    Ok(())
}

pub fn validate_sample(sample: &LocationSample) -> Result<(), CoreError> {
    validate_coordinate(&sample.coordinate())?;
    if let Some(accuracy) = sample.accuracy {
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(CoreError::Validation(format!(
                "accuracy must be a non-negative number of meters, got {}",
                accuracy
            )));
        }
    }
    Ok(())
}

/// Validate a quest definition before an engine is built around it
pub fn validate_quest(quest: &Quest) -> Result<(), CoreError> {
    if quest.title.trim().is_empty() {
        return Err(CoreError::Validation("title cannot be empty".into()));
    }

    if quest.location_latitude.is_some() != quest.location_longitude.is_some() {
        return Err(CoreError::Validation(
            "location requires both latitude and longitude".into(),
        ));
    }

    if let Some(target) = quest.target() {
        validate_coordinate(&target)?;
        if !quest.location_radius_meters.is_finite() || quest.location_radius_meters < 0.0 {
            return Err(CoreError::Validation(format!(
                "radius must be a non-negative number of meters, got {}",
                quest.location_radius_meters
            )));
        }
    }

    Ok(())
}
