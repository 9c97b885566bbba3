pub mod analysis;
pub mod query;
pub mod response;
