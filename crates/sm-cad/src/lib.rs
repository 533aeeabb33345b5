//! Geometry Kernel Abstraction
//!
//! This crate provides:
//! - The `CadKernel` trait consumed by the merge pipeline
//! - A null kernel used when no backend is compiled in
//! - An optional Truck backend (feature `truck`)
//! - Mass property helpers for planar-faced solids
//! - An in-memory prism kernel for tests (feature `testing`)

pub mod kernel;

// Re-exports for convenience
#[cfg(any(test, feature = "testing"))]
pub use kernel::{CallCounts, InjectedFailure, PrismKernel};
#[cfg(feature = "truck")]
pub use kernel::TruckKernel;
pub use kernel::{
    BooleanOutcome, BooleanType, BoundingBox, CadError, CadKernel, CadResult, FaceId, FaceInfo,
    MIN_EXTRUSION_HEIGHT, NullKernel, Solid, StepBody, StepExportOptions, StepSchema,
    VolumeProperties, Wire2D, default_kernel,
};
