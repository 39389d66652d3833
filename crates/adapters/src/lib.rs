#![deny(unsafe_code)]

pub mod http;
pub mod live;
pub mod source;
