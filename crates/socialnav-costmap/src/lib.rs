//! `socialnav-costmap` – proxemic kernels and social cost-map compositing.
//!
//! # Modules
//!
//! - [`proxemics`] – [`ProxemicZoneModel`][proxemics::ProxemicZoneModel]:
//!   one asymmetric-Gaussian kernel per speed bucket, built once.
//! - [`rotate`] – bounding-box expanding kernel rotation.
//! - [`compositor`] – [`CostMapCompositor`][compositor::CostMapCompositor]:
//!   per-cycle egocentric map with clipped max-merge.
//! - [`layer`] – [`SocialLayer`][layer::SocialLayer]: stamps social maps into
//!   a larger global grid.

pub mod compositor;
pub mod layer;
pub mod proxemics;
pub mod rotate;

pub use compositor::{ComposeStats, CostMapCompositor, LocatedPerson, MapGeometry};
pub use layer::{LayeredGrid, SocialLayer};
pub use proxemics::{ProxemicParams, ProxemicZone, ProxemicZoneModel};
pub use rotate::rotate_kernel;
