pub mod cli;
pub mod config;
pub mod events;
pub mod executor;
pub mod host;
pub mod ipc;
pub mod metadata;
pub mod runtime;
pub mod scheduler;
pub mod scripts;
pub mod settings;
pub mod tracker;
pub mod userscript;

pub use runtime::Runtime;
pub use userscript::{RunAt, Userscript};
