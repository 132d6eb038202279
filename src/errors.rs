use hifitime::Epoch;
use thiserror::Error;

/// The single error type returned by every fallible operation in this crate.
///
/// Each variant carries whatever diagnostic payload is useful for tracking down
/// the offending instant or coordinate set, mirroring the error taxonomy used
/// throughout the rest of the propagation stack.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum NyxError {
    #[error("undefined: {0}")]
    Undefined(String),

    #[error("wrong input: {0}")]
    WrongInput(String),

    #[error("conic singular: {reason}")]
    ConicSingular { reason: String },

    #[error("NaN encountered while evaluating {context}")]
    NaNEncountered { context: String },

    #[error("propagation stepped below the central body surface at epoch {epoch} (radius {radius_m} m)")]
    BelowSurface { epoch: Epoch, radius_m: f64 },

    #[error("did not converge after {iterations} iterations (tolerance {tolerance})")]
    DidNotConverge { iterations: usize, tolerance: f64 },

    #[error("maximum maneuver duration violated: candidate interval spans {duration_s} s, limit is {limit_s} s")]
    MaxDurationViolated { duration_s: f64, limit_s: f64 },

    #[error("frame {frame} is not quasi-inertial; this operation requires an inertial frame")]
    FrameNotQuasiInertial { frame: String },
}

pub type NyxResult<T> = Result<T, NyxError>;
