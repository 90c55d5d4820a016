pub mod collection;
mod resource;

pub use collection::{CollectionQuery, FilterClause, Order};
pub use resource::ResourceService;
