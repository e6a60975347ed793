//! Shared data model for the customer category inference service.
//!
//! - `customer`: the 11-field customer feature record and its JSON intake
//! - `category`: service-tier labels produced by the classifier
//! - `record`: the document persisted for every served prediction

pub mod category;
pub mod customer;
pub mod record;

pub use category::*;
pub use customer::*;
pub use record::*;
