pub mod binance;
pub mod core;
pub mod message_bus;
pub mod mock;
pub mod news;
pub mod persistence;
pub mod repositories;
pub mod ws_server;
