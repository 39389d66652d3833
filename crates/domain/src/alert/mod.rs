pub mod classifier;
pub mod entity;
pub mod error;
pub mod feed;
pub mod geo;
pub mod query;
pub mod view;
