/// Length of the face descriptors produced by the enrollment client.
pub const DESCRIPTOR_LEN: usize = 128;

/// Maximum Euclidean distance accepted as the same face.
pub const MATCH_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FaceError {
    #[error("Face descriptor must have 128 values, got {0}")]
    WrongLength(usize),

    #[error("Face descriptor contains non-finite values")]
    NonFinite,
}

pub fn validate_descriptor(descriptor: &[f32]) -> Result<(), FaceError> {
    if descriptor.len() != DESCRIPTOR_LEN {
        return Err(FaceError::WrongLength(descriptor.len()));
    }
    if descriptor.iter().any(|v| !v.is_finite()) {
        return Err(FaceError::NonFinite);
    }
    Ok(())
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn is_match(enrolled: &[f32], probe: &[f32]) -> bool {
    enrolled.len() == probe.len() && euclidean_distance(enrolled, probe) <= MATCH_THRESHOLD
}
