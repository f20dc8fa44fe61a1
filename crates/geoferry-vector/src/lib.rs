pub mod errors;
pub mod model;
pub mod normalize;
mod readers;
pub mod wkb;

pub use errors::{ReaderAttempt, VectorError};
pub use model::{Crs, Feature, Geometry, Layer, Position, VectorDataset};
pub use readers::{read_layer, read_source, read_with_readers, VectorReader};
