use log::error;
use std::panic;

/// Install pretty backtraces and make sure panics reach the log file.
///
/// Render workers run on their own threads, so a panic there would
/// otherwise only show up on stderr of a process nobody is watching.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        error!("Panic in thread '{name}': {panic_info}");
        log::logger().flush();

        default_hook(panic_info);
    }));
}
