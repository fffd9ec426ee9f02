//! Distributed columnar frames: chunked columns spread over a cluster, the
//! Rapids expression engine operating on them, per-client sessions with
//! copy-on-write reference counting, and a distributed sort-merge join.

pub mod arrays;
pub mod chunk;
pub mod cluster;
pub mod column;
pub mod config;
pub mod frame;
pub mod merge;
pub mod rangelist;
pub mod rapids;
pub mod session;
pub mod testutil;
