//! Logging setup shared by both demo roles, following the same
//! non-blocking rolling-file-appender pattern the editor binary uses.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;

pub fn configure(log_file_name: &str) -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let file_appender = tracing_appender::rolling::never(log_dir, log_file_name);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);

    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(_) => Some(guard),
        Err(_) => None,
    }
}
