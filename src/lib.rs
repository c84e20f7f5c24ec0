pub mod canon;
pub mod car;
pub mod cid;
pub mod container;
pub mod dagpb;
pub mod export;
pub mod index;
pub mod wire;

pub use canon::{canonicalize, canonicalize_to, transform, validate};
pub use cid::Cid;
pub use container::{to_container, write_container, ContainerHeader};
pub use export::{export, inspect};
pub use index::{IndexReader, PathIndexRecord};
