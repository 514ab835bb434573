pub mod cache;
pub mod db;
pub mod errors;
pub mod helpers;
pub mod multipart;
pub mod pagination;
pub mod query_params;
pub mod render;
pub mod static_server;
pub mod store;
