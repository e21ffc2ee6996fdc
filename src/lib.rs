pub mod clock;
pub mod commit;
pub mod config;
pub mod connector;
pub mod error;
pub mod file_state;
pub mod hashers;
pub mod location_states;
pub mod lock;
pub mod logging;
pub mod merge;
pub mod persist;
pub mod remotes;
pub mod repository;
pub mod repository_state;
pub mod rules;
pub mod working_directory;
