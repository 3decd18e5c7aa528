//! Host process control: spawning aside, everything the shutdown scenario
//! needs to find, signal and inspect the server.

pub mod log;
pub mod resolver;
pub mod signal;
pub mod table;

pub use log::{create_log_file, read_head, read_tail};
pub use resolver::{PidResolver, Resolution, resolve_listening_pid};
pub use signal::{Signal, is_alive, send_signal};
pub use table::{ProcessEntry, instances_of, list_processes, matching};
