//! Query slice: executor port, row-limit decorator, bounded scheduler and
//! the default row parser

mod limiting;
pub mod ports;
pub mod row_parser;
mod scheduler;

pub use limiting::LimitingQueryExecutor;
pub use ports::{
    HierarchyQuery, QueryBinding, QueryExecutor, QueryReaderOptions, Row, RowFormat, RowStream,
};
pub use row_parser::{node_select_clause, parse_node_row, NodeSelectColumn};
pub use scheduler::QueryScheduler;
