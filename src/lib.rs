pub mod backend_client;

pub mod client;

pub mod types;

pub mod ui;
