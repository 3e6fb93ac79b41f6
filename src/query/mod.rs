//! In-process evaluation of document queries: filters, projections, sorts,
//! updates and aggregation pipelines.

pub mod expression;
pub mod filter;
pub mod pipeline;
pub mod projection;
pub mod sort;
pub mod text;
pub mod update;

pub use expression::Expression;
pub use filter::Filter;
pub use pipeline::{CollectionSource, Pipeline, Stage};
pub use projection::Projection;
pub use sort::SortSpec;
pub use text::TextQuery;
pub use update::UpdateSpec;
