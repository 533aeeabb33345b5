//! CAD Kernel Abstraction Layer
//!
//! Provides a trait-based abstraction over geometry kernels so the merge
//! pipeline never touches kernel-native shapes directly.

pub mod mass;
mod traits;

#[cfg(any(test, feature = "testing"))]
mod prism;
#[cfg(feature = "truck")]
mod truck;

pub use traits::*;

#[cfg(any(test, feature = "testing"))]
pub use prism::{CallCounts, InjectedFailure, PrismKernel};
#[cfg(feature = "truck")]
pub use truck::TruckKernel;
