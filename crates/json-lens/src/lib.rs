//! `json-lens` is an in-memory JSON library built around three ideas:
//!
//! - **Lazy parsing**: [`Document::parse`] validates the input but decodes
//!   nothing. Nodes remember the byte range they were cut from and
//!   materialize children only when a key or index is demanded, so
//!   extracting a few fields from a large document touches a few slices.
//! - **Path queries**: [`Document::query`] runs a hybrid of XPath and
//!   JSONPath: `/` or `.` key chains, `[n]` indices, `[a:b]` slices, `*`
//!   wildcards, `..key` recursive descent, `..` parent steps, `[@fn]` user
//!   functions, and `[?( … )]` predicate filters with `position()`,
//!   `last()`, `exists()` and `includes()`.
//! - **Materialize-on-write mutation**: the first [`Document::set`] or
//!   [`Document::delete`] converts the lazy view into a fully owned tree;
//!   [`Document::bytes`] then re-serializes instead of echoing the input.
//!
//! ## Example
//!
//! ```
//! use json_lens::Document;
//!
//! let doc = Document::parse(
//!     r#"{"products":[
//!         {"name":"A","price":10,"inStock":true},
//!         {"name":"B","price":200,"inStock":true},
//!         {"name":"C","price":5,"inStock":false}]}"#,
//! )?;
//!
//! let affordable = doc.query("products[?(@.price < 100 && @.inStock == true)]");
//! assert_eq!(affordable.len(), 1);
//! assert_eq!(affordable.index(0).get("name").string()?, "A");
//! # Ok::<(), json_lens::Error>(())
//! ```
//!
//! Failed traversals return *invalid* nodes rather than panicking or
//! forcing a `Result` at every step; see [`Node::is_valid`] and
//! [`Node::error`].

mod document;
mod error;
mod filter;
mod funcs;
mod limit;
mod node;
mod path;
mod scan;

pub use document::{Config, Document};
pub use error::{Error, NodeType, Result};
pub use funcs::{FuncRegistry, NodeFn};
pub use node::{Member, Node};
