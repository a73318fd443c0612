//! Feature modules - vertical slices of the hierarchy engine
//!
//! - `query`: executor port, row-limit decorator, bounded scheduler, row parser
//! - `definition`: hierarchy definition protocol
//! - `formatting`: value formatter and class-hierarchy inspector ports
//! - `cache`: replaying shared streams and the level-result cache
//! - `grouping`: class / label / property grouping engine
//! - `filtering`: path-based filtering of a hierarchy definition

pub mod cache;
pub mod definition;
pub mod filtering;
pub mod formatting;
pub mod grouping;
pub mod query;
