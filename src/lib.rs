pub mod app;
pub mod badges;
pub mod calendar;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod layout;
pub mod local_store;
pub mod models;
pub mod remote;
pub mod state;
pub mod stats;
pub mod sync;
pub mod tracker;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use tracker::Tracker;
