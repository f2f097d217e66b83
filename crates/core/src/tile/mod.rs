//! Tile addressing and the layer model.
//!
//! - `address`: `<base>/<z>/<x>/<y>.<format>` codec and template helpers
//! - `layer`: layer descriptors and namespace naming
//! - `status`: offline availability classification

pub mod address;
pub mod layer;
pub mod status;

pub use address::{TileAddress, TileCoord, resolve_base, template_format};
pub use layer::{
    LayerDescriptor, OVERLAY_PREFIX, SCRATCH_NAMESPACE, VECTOR_NAMESPACE, generation_of, is_overlay_namespace,
    overlay_namespace,
};
pub use status::CacheStatus;
