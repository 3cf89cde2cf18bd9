//! A small static file server driving [`Response`](crate::http::response::Response)
//! over plain TCP.

pub mod connection;
pub mod listener;
pub mod parser;
pub mod tcp;
