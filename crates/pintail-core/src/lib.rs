pub mod corpus;
pub mod decoder;
pub mod dict;
pub mod metrics;
pub mod model;
