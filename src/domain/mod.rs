pub mod models;
pub mod projection;
