//! Outer adapters: the JSON catalog loader and the CSV request/order codecs.

pub mod catalog;
pub mod csv;
