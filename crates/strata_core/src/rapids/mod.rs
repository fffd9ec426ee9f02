//! Rapids, the s-expression language clients use to manipulate frames.

pub mod ast;
pub mod env;
pub mod ops;
pub mod value;
