mod ingest;
mod shutdown;

pub use ingest::handle_ingest;
pub use shutdown::{INTERRUPTED_EXIT_CODE, SHUTDOWN_GRACE, run_until_signal};
