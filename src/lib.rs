pub mod app;
pub mod db;
pub mod domain;
pub mod errors;
pub mod external;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;
pub mod settings;
pub mod state;

#[cfg(test)]
pub mod test_support;
