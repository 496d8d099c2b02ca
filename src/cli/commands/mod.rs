pub mod db;
pub mod user;
pub mod worker;
