pub mod api_connection;
pub mod cli;
pub mod db;
pub mod matching;
pub mod models;
pub mod nutrition;
pub mod pipeline;
pub mod search;
