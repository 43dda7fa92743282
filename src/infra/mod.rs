pub mod app;
pub mod config;
pub mod db;
pub mod gateway;
pub mod setup;
pub mod sweep_worker;
