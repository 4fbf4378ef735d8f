pub mod action;
pub mod error;
pub mod filter;
pub mod ids;
pub mod operations;
pub mod system_ids;
pub mod triple;
pub mod value;

pub use action::{Action, SpaceActions};
pub use error::CoreError;
pub use ids::*;
pub use operations::Op;
pub use triple::{Triple, TripleKey};
pub use value::{CollectionItem, CollectionItemEntity, EntityRef, Value, ValueType};
