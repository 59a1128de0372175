//! Subgraph query model: descriptions, the finalized query, the vertex
//! constraint grammar, partial matches, and the result map that holds them.

pub mod description;
pub mod expr;
pub mod result;
pub mod result_map;
pub mod subquery;

pub use description::{EdgeDescription, EdgeDescriptionBuilder, OpenTimeRange};
pub use expr::VertexConstraint;
pub use result::PartialMatch;
pub use result_map::ResultMap;
pub use subquery::{SubgraphQuery, SubgraphQueryBuilder};
