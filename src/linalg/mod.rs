pub mod ast;
mod from_graph;
mod pprint;

pub use from_graph::from_graph;
