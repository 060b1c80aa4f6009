//! Operator tooling for the review insight response cache

pub mod commands;
pub mod reviews;

pub use reviews::{load_reviews, parse_reviews};
