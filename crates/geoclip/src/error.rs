use thiserror::Error;

/// Errors raised when a geometry cannot be constructed or processed.
///
/// During ingestion these are recoverable: the offending geometry is dropped
/// and counted in a [`RepairReport`](crate::RepairReport).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// A ring collapsed below the minimum vertex count.
    #[error("ring has {found} distinct points, at least 3 are required")]
    TooFewPoints { found: usize },
    /// A hole ring reaches outside its exterior ring's bounding box.
    #[error("hole {index} is not contained in the exterior ring's bounding box")]
    HoleOutsideExterior { index: usize },
    /// A coordinate is NaN or infinite.
    #[error("geometry contains non-finite coordinates")]
    NonFinite,
    /// Buffer distances must be positive and finite.
    #[error("buffer distance must be positive and finite, got {0}")]
    InvalidDistance(f64),
}
