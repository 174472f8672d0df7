// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{
    HostEntry, OutputFormat, init_logging, load_hosts_from_file, load_hosts_from_source,
    parse_host_line,
};
